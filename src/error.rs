//! Comprehensive error handling for Pulsegate backend
//!
//! This module provides a unified error system with proper HTTP status mapping,
//! user-friendly messages, and structured error codes for client handling.

#[cfg(feature = "database")]
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "database")]
use crate::callbacks::delivery::DeliveryError;
#[cfg(feature = "database")]
use crate::callbacks::engine::EngineError;
#[cfg(feature = "database")]
use crate::callbacks::store::StoreError;

/// Gateway error codes for programmatic handling
#[cfg(feature = "database")]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "TRANSACTION_NOT_REDELIVERABLE")]
    TransactionNotRedeliverable,
    #[serde(rename = "CALLBACK_IN_FLIGHT")]
    CallbackInFlight,
    #[serde(rename = "MERCHANT_NOT_FOUND")]
    MerchantNotFound,
    #[serde(rename = "CALLBACK_URL_MISSING")]
    CallbackUrlMissing,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "QUEUE_SATURATED")]
    QueueSaturated,
    #[serde(rename = "QUEUE_UNAVAILABLE")]
    QueueUnavailable,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 504)
    #[serde(rename = "MERCHANT_ENDPOINT_ERROR")]
    MerchantEndpointError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[cfg(feature = "database")]
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Transaction with given ID doesn't exist
    TransactionNotFound { transaction_id: String },
    /// Transaction status does not allow another callback delivery
    NotRedeliverable {
        transaction_id: String,
        status_code: i32,
    },
    /// A delivery for this transaction is already queued or posting
    CallbackInFlight { transaction_id: String },
    /// No merchant is registered for the transaction's app credentials
    MerchantNotFound { app_key: String, app_id: String },
    /// Neither the transaction, its app, nor its merchant carries a callback URL
    CallbackUrlMissing { app_id: String },
}

/// Infrastructure-level errors (database, queues, configuration)
#[cfg(feature = "database")]
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Delivery queue at capacity
    QueueSaturated { queue: String },
    /// Delivery queue consumer is gone
    QueueUnavailable { queue: String },
    /// Payload could not be serialized
    Serialization { message: String },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// External service errors (merchant callback endpoints)
#[cfg(feature = "database")]
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Merchant endpoint unreachable or answered with a non-200
    MerchantEndpoint { message: String, is_retryable: bool },
    /// External service timeout
    Timeout { service: String },
}

/// Input validation errors
#[cfg(feature = "database")]
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Required field missing
    MissingField { field: String },
    /// Field value rejected
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[cfg(feature = "database")]
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[cfg(feature = "database")]
#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

#[cfg(feature = "database")]
impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::NotRedeliverable { .. } => 422, // Unprocessable Entity
                DomainError::CallbackInFlight { .. } => 409, // Conflict
                DomainError::MerchantNotFound { .. } => 422,
                DomainError::CallbackUrlMissing { .. } => 422,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::QueueSaturated { .. } => 503, // Service Unavailable
                InfrastructureError::QueueUnavailable { .. } => 500,
                InfrastructureError::Serialization { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::MerchantEndpoint { .. } => 502, // Bad Gateway
                ExternalError::Timeout { .. } => 504,          // Gateway Timeout
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { .. } => 400,
                ValidationError::InvalidField { .. } => 400,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::NotRedeliverable { .. } => ErrorCode::TransactionNotRedeliverable,
                DomainError::CallbackInFlight { .. } => ErrorCode::CallbackInFlight,
                DomainError::MerchantNotFound { .. } => ErrorCode::MerchantNotFound,
                DomainError::CallbackUrlMissing { .. } => ErrorCode::CallbackUrlMissing,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::QueueSaturated { .. } => ErrorCode::QueueSaturated,
                InfrastructureError::QueueUnavailable { .. } => ErrorCode::QueueUnavailable,
                InfrastructureError::Serialization { .. } => ErrorCode::InternalError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::MerchantEndpoint { .. } => ErrorCode::MerchantEndpointError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { transaction_id } => {
                    format!("Transaction '{}' not found", transaction_id)
                }
                DomainError::NotRedeliverable {
                    transaction_id,
                    status_code,
                } => {
                    format!(
                        "Transaction '{}' is in status {} and cannot be re-delivered",
                        transaction_id, status_code
                    )
                }
                DomainError::CallbackInFlight { transaction_id } => {
                    format!(
                        "A callback for transaction '{}' is already being delivered",
                        transaction_id
                    )
                }
                DomainError::MerchantNotFound { app_id, .. } => {
                    format!("No merchant is registered for app '{}'", app_id)
                }
                DomainError::CallbackUrlMissing { app_id } => {
                    format!("No callback URL is configured for app '{}'", app_id)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::MerchantEndpoint { is_retryable, .. } => {
                    if *is_retryable {
                        "Merchant endpoint is temporarily unavailable. Please try again"
                            .to_string()
                    } else {
                        "Merchant endpoint rejected the callback. Please contact support"
                            .to_string()
                    }
                }
                ExternalError::Timeout { service } => {
                    format!("{} request timed out. Please try again", service)
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::QueueSaturated { .. } => true,
                InfrastructureError::QueueUnavailable { .. } => false,
                InfrastructureError::Serialization { .. } => false,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::MerchantEndpoint { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

#[cfg(feature = "database")]
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

#[cfg(feature = "database")]
impl std::error::Error for AppError {}

// Conversions from specific error types
// Note: From<DatabaseError> is implemented in database/error.rs to avoid circular dependency

#[cfg(feature = "database")]
impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        use EngineError as EE;

        let kind = match err {
            EE::TransactionNotFound { transaction_id } => {
                AppErrorKind::Domain(DomainError::TransactionNotFound { transaction_id })
            }
            EE::NotRedeliverable {
                transaction_id,
                status_code,
            } => AppErrorKind::Domain(DomainError::NotRedeliverable {
                transaction_id,
                status_code,
            }),
            EE::AlreadyInFlight { transaction_id } => {
                AppErrorKind::Domain(DomainError::CallbackInFlight { transaction_id })
            }
            EE::UnknownMerchant { app_key, app_id } => {
                AppErrorKind::Domain(DomainError::MerchantNotFound { app_key, app_id })
            }
            EE::MissingCallbackUrl { app_id } => {
                AppErrorKind::Domain(DomainError::CallbackUrlMissing { app_id })
            }
            EE::QueueFull => AppErrorKind::Infrastructure(InfrastructureError::QueueSaturated {
                queue: "success".to_string(),
            }),
            EE::QueueClosed => {
                AppErrorKind::Infrastructure(InfrastructureError::QueueUnavailable {
                    queue: "success".to_string(),
                })
            }
            EE::Store(StoreError::TransactionVanished { transaction_id }) => {
                AppErrorKind::Domain(DomainError::TransactionNotFound { transaction_id })
            }
            EE::Store(StoreError::Backend(err)) => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message: err.to_string(),
                    is_retryable: false,
                })
            }
            EE::Payload(err) => AppErrorKind::Infrastructure(InfrastructureError::Serialization {
                message: err.to_string(),
            }),
        };

        AppError::new(kind)
    }
}

#[cfg(feature = "database")]
impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        use DeliveryError as DE;

        let kind = match err {
            DE::Rejected { status, .. } => {
                AppErrorKind::External(ExternalError::MerchantEndpoint {
                    message: format!("merchant endpoint answered {}", status),
                    is_retryable: true,
                })
            }
            DE::Transport(err) if err.is_timeout() => {
                AppErrorKind::External(ExternalError::Timeout {
                    service: "merchant callback".to_string(),
                })
            }
            DE::Transport(err) | DE::Client(err) => {
                AppErrorKind::External(ExternalError::MerchantEndpoint {
                    message: err.to_string(),
                    is_retryable: true,
                })
            }
        };

        AppError::new(kind)
    }
}

/// Result type for operations that can fail with AppError
#[cfg(feature = "database")]
pub type AppResult<T> = Result<T, AppError>;

#[cfg(all(test, feature = "database"))]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_not_found_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::TransactionNotFound {
            transaction_id: "tx-missing".to_string(),
        }));

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::TransactionNotFound);
        assert!(error.user_message().contains("tx-missing"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_callback_in_flight_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::CallbackInFlight {
            transaction_id: "tx-busy".to_string(),
        }));

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::CallbackInFlight);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_queue_saturated_error() {
        let error = AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::QueueSaturated {
                queue: "success".to_string(),
            },
        ));

        assert_eq!(error.status_code(), 503);
        assert_eq!(error.error_code(), ErrorCode::QueueSaturated);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: "transaction_id".to_string(),
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_engine_error_conversion() {
        let error = AppError::from(EngineError::NotRedeliverable {
            transaction_id: "tx-1".to_string(),
            status_code: 1001,
        });

        assert_eq!(error.status_code(), 422);
        assert_eq!(error.error_code(), ErrorCode::TransactionNotRedeliverable);
        assert!(error.user_message().contains("1001"));
    }
}
