use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use crate::callbacks::status::TransactionStatus;
use crate::callbacks::store::{StoreError, TransactionStore};
use crate::callbacks::types::Transaction;
use crate::database::error::DatabaseError;

// Shared projection for every transaction read. Text columns that older
// writers left NULL are coalesced so the row maps onto plain strings.
const TRANSACTION_COLUMNS: &str = "\
    t.id, t.merchant_tx_id, t.status_code, t.payment_method, t.amount, t.charged_amount, \
    t.currency, t.item_id, t.item_name, t.user_id, \
    COALESCE(t.user_ip, '') AS user_ip, COALESCE(t.user_mdn, '') AS user_mdn, \
    t.app_id, t.app_key, COALESCE(t.merchant_name, '') AS merchant_name, \
    COALESCE(t.provider_reference, '') AS provider_reference, \
    COALESCE(t.callback_reference, '') AS callback_reference, \
    COALESCE(t.notification_url, '') AS notification_url, \
    t.callback_at, COALESCE(t.callback_result, '') AS callback_result, t.created_at";

/// Postgres-backed transaction store.
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn find_awaiting_success_callback(&self) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} \
             FROM transactions t \
             WHERE t.status_code = $1 \
               AND COALESCE(t.callback_result, '') <> 'failed' \
             ORDER BY t.created_at ASC"
        ))
        .bind(TransactionStatus::AwaitingNotification.code())
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(rows)
    }

    async fn find_awaiting_failure_callback(
        &self,
        window: Duration,
    ) -> Result<Vec<Transaction>, StoreError> {
        let window_hours = window.as_secs_f64() / 3600.0;
        let rows = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} \
             FROM transactions t \
             INNER JOIN merchant_apps a \
                ON t.app_key = a.app_key AND t.app_id = a.app_id \
             INNER JOIN merchants m \
                ON m.id = a.merchant_id \
             WHERE t.status_code = $1 \
               AND COALESCE(t.callback_result, '') = '' \
               AND t.created_at >= NOW() - ($2 * INTERVAL '1 hour') \
               AND m.fail_callback = TRUE \
             ORDER BY t.created_at ASC"
        ))
        .bind(TransactionStatus::Failed.code())
        .bind(window_hours)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(rows)
    }

    async fn find_by_id(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(row)
    }

    async fn record_callback_outcome(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        callback_at: Option<DateTime<Utc>>,
        result: &str,
    ) -> Result<(), StoreError> {
        // callback_at and callback_result keep their previous values when
        // the caller passes None / an empty string.
        let outcome = sqlx::query(
            "UPDATE transactions \
             SET status_code = $2, \
                 callback_at = COALESCE($3, callback_at), \
                 callback_result = CASE WHEN $4 = '' THEN callback_result ELSE $4 END \
             WHERE id = $1",
        )
        .bind(transaction_id)
        .bind(status.code())
        .bind(callback_at)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if outcome.rows_affected() == 0 {
            return Err(StoreError::TransactionVanished {
                transaction_id: transaction_id.to_string(),
            });
        }
        Ok(())
    }
}
