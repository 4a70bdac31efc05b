use crate::error::{AppError, AppErrorKind, InfrastructureError};

/// Classified database failure.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct DatabaseError {
    kind: DatabaseErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseErrorKind {
    /// Pool or network level failure; retryable.
    #[error("database connection error: {message}")]
    Connection { message: String },
    /// The database rejected the statement.
    #[error("database query error: {message}")]
    Query { message: String },
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
    #[error("database error: {message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &DatabaseErrorKind {
        &self.kind
    }

    /// Classify an sqlx error. Pool and transport problems become
    /// `Connection` (retryable); server-side rejections become `Query` or
    /// `UniqueViolation`.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::Connection {
                    message: err.to_string(),
                }
            }
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    DatabaseErrorKind::UniqueViolation {
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    }
                } else {
                    DatabaseErrorKind::Query {
                        message: db_err.to_string(),
                    }
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }
}

// From<DatabaseError> lives here rather than in error.rs to avoid a circular
// dependency between the two modules.
impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let is_retryable = err.is_retryable();
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: err.to_string(),
            is_retryable,
        }))
    }
}

impl From<DatabaseError> for crate::callbacks::store::StoreError {
    fn from(err: DatabaseError) -> Self {
        crate::callbacks::store::StoreError::Backend(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        assert!(matches!(
            err.kind(),
            DatabaseErrorKind::Connection { .. }
        ));
    }

    #[test]
    fn row_not_found_is_not_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn query_rejections_are_not_retryable() {
        let err = DatabaseError::new(DatabaseErrorKind::Query {
            message: "syntax error".to_string(),
        });
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "database query error: syntax error");
    }
}
