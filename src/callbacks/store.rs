//! Storage seams the callback engine reads and writes through.
//!
//! The engine never touches SQL directly; it speaks to these traits so the
//! discovery predicates and outcome writes can be exercised against
//! in-memory fakes. The Postgres implementations live under
//! `crate::database`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::callbacks::status::TransactionStatus;
use crate::callbacks::types::{MerchantProfile, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The conditional outcome update matched zero rows.
    #[error("transaction {transaction_id} vanished during callback recording")]
    TransactionVanished { transaction_id: String },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Read and write access to the transactions table.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Transactions whose charge is confirmed and whose success callback has
    /// not been recorded as permanently failed.
    async fn find_awaiting_success_callback(&self) -> Result<Vec<Transaction>, StoreError>;

    /// Failed transactions created within `window` whose callback result is
    /// still unset and whose merchant opted into failure notifications.
    async fn find_awaiting_failure_callback(
        &self,
        window: Duration,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn find_by_id(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError>;

    /// Record a delivery outcome: status code, optional acknowledgement
    /// timestamp, and the merchant-reported result string. Implementations
    /// must return [`StoreError::TransactionVanished`] when no row matches.
    async fn record_callback_outcome(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        callback_at: Option<DateTime<Utc>>,
        result: &str,
    ) -> Result<(), StoreError>;
}

/// Merchant profile lookup by application credentials.
#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    async fn find_by_app(
        &self,
        app_key: &str,
        app_id: &str,
    ) -> Result<Option<MerchantProfile>, StoreError>;
}
