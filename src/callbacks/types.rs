//! Core data types moved between the discovery sweeps, the queues and the
//! delivery workers.

use sqlx::FromRow;
use uuid::Uuid;

use crate::callbacks::status::TransactionStatus;

/// Transaction entity as read by the callback sweeps.
///
/// Text columns that legacy writers leave NULL are coalesced to empty
/// strings at query time, so an empty string here always means "not set".
#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub id: String,
    pub merchant_tx_id: String,
    pub status_code: i32,
    pub payment_method: String,
    pub amount: i64,
    pub charged_amount: i64,
    pub currency: String,
    pub item_id: String,
    pub item_name: String,
    pub user_id: String,
    pub user_ip: String,
    pub user_mdn: String,
    pub app_id: String,
    pub app_key: String,
    pub merchant_name: String,
    pub provider_reference: String,
    pub callback_reference: String,
    pub notification_url: String,
    pub callback_at: Option<chrono::DateTime<chrono::Utc>>,
    pub callback_result: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Transaction {
    pub fn status(&self) -> Option<TransactionStatus> {
        TransactionStatus::from_code(self.status_code)
    }
}

/// Per-application registration under a merchant account.
#[derive(Debug, Clone, FromRow)]
pub struct MerchantApp {
    pub app_id: String,
    pub app_key: String,
    pub callback_url: String,
}

/// Merchant account joined with its registered applications.
#[derive(Debug, Clone)]
pub struct MerchantProfile {
    pub merchant_id: i64,
    pub name: String,
    pub secret: String,
    pub callback_url: String,
    /// Merchants opt in to failure notifications; everyone gets success ones.
    pub fail_callback: bool,
    pub apps: Vec<MerchantApp>,
}

impl MerchantProfile {
    /// Pick the URL a callback for this transaction must be POSTed to.
    ///
    /// A per-transaction notification URL (set by operator re-delivery)
    /// overrides the registered ones; otherwise the app-level URL wins over
    /// the merchant-level default. Returns None when nothing usable is
    /// configured, in which case the transaction is skipped rather than
    /// failed.
    pub fn resolve_callback_url(&self, transaction: &Transaction) -> Option<String> {
        if !transaction.notification_url.is_empty() {
            return Some(transaction.notification_url.clone());
        }
        let app_url = self
            .apps
            .iter()
            .find(|app| app.app_id == transaction.app_id)
            .map(|app| app.callback_url.as_str())
            .filter(|url| !url.is_empty());
        if let Some(url) = app_url {
            return Some(url.to_string());
        }
        if !self.callback_url.is_empty() {
            return Some(self.callback_url.clone());
        }
        None
    }
}

/// Which sweep produced a delivery job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Success,
    Failure,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::Success => "success",
            CallbackKind::Failure => "failure",
        }
    }
}

/// A fully prepared callback waiting for (re)delivery.
///
/// The body is serialized exactly once when the job is built; workers sign
/// and send these bytes untouched so the signature always matches what the
/// merchant receives.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub correlation_id: Uuid,
    pub transaction_id: String,
    pub url: String,
    pub secret: String,
    pub body: Vec<u8>,
    /// Status code written back when the merchant acknowledges this body.
    pub notify_status: TransactionStatus,
    pub kind: CallbackKind,
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction() -> Transaction {
        Transaction {
            id: "tx-100".to_string(),
            merchant_tx_id: "m-100".to_string(),
            status_code: 1003,
            payment_method: "wallet".to_string(),
            amount: 1500,
            charged_amount: 1500,
            currency: "THB".to_string(),
            item_id: "sku-1".to_string(),
            item_name: "Gold pack".to_string(),
            user_id: "u-1".to_string(),
            user_ip: "10.0.0.5".to_string(),
            user_mdn: "66810000001".to_string(),
            app_id: "app-1".to_string(),
            app_key: "key-1".to_string(),
            merchant_name: "Acme Games".to_string(),
            provider_reference: String::new(),
            callback_reference: "ref-100".to_string(),
            notification_url: String::new(),
            callback_at: None,
            callback_result: String::new(),
            created_at: chrono::Utc::now(),
        }
    }

    fn profile() -> MerchantProfile {
        MerchantProfile {
            merchant_id: 7,
            name: "Acme Games".to_string(),
            secret: "s3cret".to_string(),
            callback_url: "https://acme.example/fallback".to_string(),
            fail_callback: true,
            apps: vec![MerchantApp {
                app_id: "app-1".to_string(),
                app_key: "key-1".to_string(),
                callback_url: "https://acme.example/app-1".to_string(),
            }],
        }
    }

    #[test]
    fn app_url_wins_over_merchant_default() {
        let url = profile().resolve_callback_url(&transaction());
        assert_eq!(url.as_deref(), Some("https://acme.example/app-1"));
    }

    #[test]
    fn merchant_default_used_for_unknown_app() {
        let mut tx = transaction();
        tx.app_id = "app-other".to_string();
        let url = profile().resolve_callback_url(&tx);
        assert_eq!(url.as_deref(), Some("https://acme.example/fallback"));
    }

    #[test]
    fn transaction_override_wins() {
        let mut tx = transaction();
        tx.notification_url = "https://ops.example/replay".to_string();
        let url = profile().resolve_callback_url(&tx);
        assert_eq!(url.as_deref(), Some("https://ops.example/replay"));
    }

    #[test]
    fn no_configured_url_yields_none() {
        let mut merchant = profile();
        merchant.callback_url = String::new();
        merchant.apps[0].callback_url = String::new();
        assert_eq!(merchant.resolve_callback_url(&transaction()), None);
    }

    #[test]
    fn status_decodes_known_codes() {
        let tx = transaction();
        assert_eq!(tx.status(), Some(TransactionStatus::AwaitingNotification));
        let mut odd = transaction();
        odd.status_code = 42;
        assert_eq!(odd.status(), None);
    }
}
