//! Merchant callback payload construction.
//!
//! Two wire schemas are in production: the current one and a legacy one kept
//! for a fixed allow-list of early merchants. A handful of merchants also
//! carry field-level quirks (string vs numeric amount, payment-method
//! aliases, echoed app credentials). All of that is resolved once per
//! merchant profile into a [`WireFormat`] so the builders stay pure and the
//! delivery path never branches on merchant identity.
//!
//! Field order inside each schema struct is part of the wire contract:
//! merchants verify `bodysign` over the serialized bytes, and several parse
//! positionally. Do not reorder fields or rename keys.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::callbacks::status::TransactionStatus;
use crate::callbacks::types::{MerchantProfile, Transaction};

/// Merchants still integrated against the first-generation schema, matched
/// by registered name or shared secret.
const LEGACY_SCHEMA_MERCHANTS: [(&str, &str); 4] = [
    ("PM Max", "gmtb50vcf5qcvwr"),
    ("Coda", "71mczdtiyfaunj5"),
    ("TutuReels", "UPF6qN7b2nP5geg"),
    ("Redigame2", "gjq7ygxhztmlkgg"),
];

/// Merchants that receive the current-schema `amount` as a JSON number.
/// Everyone else gets it as a string.
const NUMERIC_AMOUNT_MERCHANTS: [(&str, &str); 1] =
    [("LeisureLink Digital Limited", "o_G0JIzzJLditvj")];

/// Merchants that expect `app_id` / `client_appkey` echoed back in the
/// current schema.
const APP_CREDENTIAL_MERCHANTS: [(&str, &str); 1] =
    [("Zingplay International PTE,. LTD", "9qyxr81YWU2BNlO")];

/// Shared secrets whose callbacks carry the provider reference instead of
/// the internal transaction id.
const PROVIDER_REFERENCE_SECRETS: [&str; 1] = ["08gf6K6t7cRdvoM"];

/// Merchants that expect `qr` where the charging flow records `qris`.
const QR_ALIAS_MERCHANTS: [&str; 1] = ["HIGO GAME PTE LTD"];

fn matches_any(profile: &MerchantProfile, entries: &[(&str, &str)]) -> bool {
    entries
        .iter()
        .any(|(name, secret)| profile.name == *name || profile.secret == *secret)
}

/// Which callback schema a merchant receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    Current,
    Legacy,
}

/// Wire-level quirks for one merchant, resolved once at profile load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFormat {
    pub schema: SchemaVariant,
    pub amount_as_string: bool,
    pub include_app_credentials: bool,
    /// `(recorded, transmitted)` payment-method substitutions.
    pub method_aliases: Vec<(String, String)>,
    pub reference_from_provider: bool,
}

impl WireFormat {
    pub fn resolve(profile: &MerchantProfile) -> Self {
        let schema = if matches_any(profile, &LEGACY_SCHEMA_MERCHANTS) {
            SchemaVariant::Legacy
        } else {
            SchemaVariant::Current
        };
        let method_aliases = if QR_ALIAS_MERCHANTS.contains(&profile.name.as_str()) {
            vec![("qris".to_string(), "qr".to_string())]
        } else {
            Vec::new()
        };
        WireFormat {
            schema,
            amount_as_string: !matches_any(profile, &NUMERIC_AMOUNT_MERCHANTS),
            include_app_credentials: matches_any(profile, &APP_CREDENTIAL_MERCHANTS),
            method_aliases,
            reference_from_provider: PROVIDER_REFERENCE_SECRETS
                .contains(&profile.secret.as_str()),
        }
    }

    fn wire_payment_method(&self, method: &str) -> String {
        for (recorded, transmitted) in &self.method_aliases {
            if method == recorded {
                return transmitted.clone();
            }
        }
        method.to_string()
    }

    fn wire_amount(&self, amount: i64) -> WireAmount {
        if self.amount_as_string {
            WireAmount::Text(amount.to_string())
        } else {
            WireAmount::Number(amount)
        }
    }

    fn wire_reference(&self, transaction: &Transaction) -> String {
        if self.reference_from_provider {
            transaction.provider_reference.clone()
        } else {
            transaction.id.clone()
        }
    }
}

/// Amount rendered per merchant preference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireAmount {
    Number(i64),
    Text(String),
}

/// Current-generation callback body.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackPayload {
    pub user_id: String,
    pub merchant_transaction_id: String,
    pub status_code: i32,
    pub payment_method: String,
    pub amount: WireAmount,
    pub status: String,
    pub currency: String,
    pub item_name: String,
    pub item_id: String,
    pub reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_appkey: Option<String>,
}

/// First-generation callback body. `charging_amount` is carried on success
/// notifications only; `fail_reason` on failure ones only.
#[derive(Debug, Clone, Serialize)]
pub struct LegacyCallbackPayload {
    pub app_id: String,
    pub client_appkey: String,
    pub user_id: String,
    pub user_ip: String,
    pub user_mdn: String,
    pub merchant_transaction_id: String,
    pub transaction_description: String,
    pub payment_method: String,
    pub currency: String,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_amount: Option<String>,
    pub status_code: String,
    pub status: String,
    pub item_id: String,
    pub item_name: String,
    pub updated_at: String,
    pub reference_id: String,
    pub testing: String,
    pub custom: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
}

/// Either schema, serialized transparently.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MerchantCallback {
    Current(CallbackPayload),
    Legacy(LegacyCallbackPayload),
}

/// Builder output: the structured payload plus the bytes that will be signed
/// and transmitted. The bytes are serialized exactly once here.
#[derive(Debug, Clone)]
pub struct BuiltCallback {
    pub payload: MerchantCallback,
    pub body: Vec<u8>,
    /// Status code the outcome recorder writes when the merchant acks.
    pub notify_status: TransactionStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("transaction has unknown status code {code}")]
    UnknownStatus { code: i32 },
    #[error("failed to serialize callback payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Build the success notification for a confirmed transaction.
///
/// Pure: two calls with identical inputs yield byte-identical bodies. The
/// caller supplies `at` (legacy `updated_at`) instead of the builder reading
/// the clock.
pub fn build_success_payload(
    transaction: &Transaction,
    format: &WireFormat,
    at: DateTime<Utc>,
) -> Result<BuiltCallback, PayloadError> {
    let payment_method = format.wire_payment_method(&transaction.payment_method);
    let payload = match format.schema {
        SchemaVariant::Legacy => MerchantCallback::Legacy(LegacyCallbackPayload {
            app_id: transaction.app_id.clone(),
            client_appkey: transaction.app_key.clone(),
            user_id: transaction.user_id.clone(),
            user_ip: transaction.user_ip.clone(),
            user_mdn: transaction.user_mdn.clone(),
            merchant_transaction_id: transaction.merchant_tx_id.clone(),
            transaction_description: String::new(),
            payment_method,
            currency: transaction.currency.clone(),
            amount: transaction.amount,
            charging_amount: Some(transaction.charged_amount.to_string()),
            status_code: TransactionStatus::Completed.code().to_string(),
            status: "success".to_string(),
            item_id: transaction.item_id.clone(),
            item_name: transaction.item_name.clone(),
            updated_at: at.timestamp().to_string(),
            reference_id: transaction.callback_reference.clone(),
            testing: "0".to_string(),
            custom: String::new(),
            fail_reason: None,
        }),
        SchemaVariant::Current => {
            let (app_id, client_appkey) = app_credentials(format, transaction);
            MerchantCallback::Current(CallbackPayload {
                user_id: transaction.user_id.clone(),
                merchant_transaction_id: transaction.merchant_tx_id.clone(),
                status_code: TransactionStatus::Completed.code(),
                payment_method,
                amount: format.wire_amount(transaction.amount),
                status: "success".to_string(),
                currency: transaction.currency.clone(),
                item_name: transaction.item_name.clone(),
                item_id: transaction.item_id.clone(),
                reference_id: format.wire_reference(transaction),
                app_id,
                client_appkey,
            })
        }
    };
    finish(payload, TransactionStatus::Completed)
}

/// Build the failure notification for a failed (or still pending) transaction.
///
/// The notification carries the transaction's current status code, and that
/// same code is written back on acknowledgement, so a failure callback never
/// moves the transaction's status.
pub fn build_failure_payload(
    transaction: &Transaction,
    format: &WireFormat,
    at: DateTime<Utc>,
) -> Result<BuiltCallback, PayloadError> {
    let status = transaction.status().ok_or(PayloadError::UnknownStatus {
        code: transaction.status_code,
    })?;
    let label = status.failure_label();
    let payment_method = format.wire_payment_method(&transaction.payment_method);
    let payload = match format.schema {
        SchemaVariant::Legacy => MerchantCallback::Legacy(LegacyCallbackPayload {
            app_id: transaction.app_id.clone(),
            client_appkey: transaction.app_key.clone(),
            user_id: transaction.user_id.clone(),
            user_ip: transaction.user_ip.clone(),
            user_mdn: transaction.user_mdn.clone(),
            merchant_transaction_id: transaction.merchant_tx_id.clone(),
            transaction_description: String::new(),
            payment_method,
            currency: transaction.currency.clone(),
            amount: transaction.amount,
            charging_amount: None,
            status_code: status.code().to_string(),
            status: label.to_string(),
            item_id: transaction.item_id.clone(),
            item_name: transaction.item_name.clone(),
            updated_at: at.timestamp().to_string(),
            reference_id: transaction.callback_reference.clone(),
            testing: "0".to_string(),
            custom: String::new(),
            fail_reason: Some(label.to_string()),
        }),
        SchemaVariant::Current => {
            let (app_id, client_appkey) = app_credentials(format, transaction);
            MerchantCallback::Current(CallbackPayload {
                user_id: transaction.user_id.clone(),
                merchant_transaction_id: transaction.merchant_tx_id.clone(),
                status_code: status.code(),
                payment_method,
                amount: format.wire_amount(transaction.amount),
                status: label.to_string(),
                currency: transaction.currency.clone(),
                item_name: transaction.item_name.clone(),
                item_id: transaction.item_id.clone(),
                reference_id: format.wire_reference(transaction),
                app_id,
                client_appkey,
            })
        }
    };
    finish(payload, status)
}

fn app_credentials(
    format: &WireFormat,
    transaction: &Transaction,
) -> (Option<String>, Option<String>) {
    if format.include_app_credentials {
        (
            Some(transaction.app_id.clone()),
            Some(transaction.app_key.clone()),
        )
    } else {
        (None, None)
    }
}

fn finish(
    payload: MerchantCallback,
    notify_status: TransactionStatus,
) -> Result<BuiltCallback, PayloadError> {
    let body = serde_json::to_vec(&payload)?;
    Ok(BuiltCallback {
        payload,
        body,
        notify_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::types::MerchantApp;
    use chrono::TimeZone;

    fn transaction() -> Transaction {
        Transaction {
            id: "tx-1".to_string(),
            merchant_tx_id: "m-1".to_string(),
            status_code: 1003,
            payment_method: "wallet".to_string(),
            amount: 1500,
            charged_amount: 1650,
            currency: "THB".to_string(),
            item_id: "sku-1".to_string(),
            item_name: "Gold pack".to_string(),
            user_id: "u-1".to_string(),
            user_ip: "10.0.0.5".to_string(),
            user_mdn: "66810000001".to_string(),
            app_id: "app-1".to_string(),
            app_key: "key-1".to_string(),
            merchant_name: "Acme Games".to_string(),
            provider_reference: "prov-9".to_string(),
            callback_reference: "ref-1".to_string(),
            notification_url: String::new(),
            callback_at: None,
            callback_result: String::new(),
            created_at: chrono::Utc::now(),
        }
    }

    fn profile(name: &str, secret: &str) -> MerchantProfile {
        MerchantProfile {
            merchant_id: 1,
            name: name.to_string(),
            secret: secret.to_string(),
            callback_url: "https://merchant.example/cb".to_string(),
            fail_callback: true,
            apps: vec![MerchantApp {
                app_id: "app-1".to_string(),
                app_key: "key-1".to_string(),
                callback_url: "https://merchant.example/cb".to_string(),
            }],
        }
    }

    fn at() -> DateTime<Utc> {
        chrono::Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn current_schema_success_is_wire_frozen() {
        let format = WireFormat::resolve(&profile("Acme Games", "secret-a"));
        let built = build_success_payload(&transaction(), &format, at()).unwrap();
        let expected = concat!(
            r#"{"user_id":"u-1","merchant_transaction_id":"m-1","status_code":1000,"#,
            r#""payment_method":"wallet","amount":"1500","status":"success","#,
            r#""currency":"THB","item_name":"Gold pack","item_id":"sku-1","#,
            r#""reference_id":"tx-1"}"#
        );
        assert_eq!(String::from_utf8(built.body).unwrap(), expected);
        assert_eq!(built.notify_status, TransactionStatus::Completed);
    }

    #[test]
    fn numeric_amount_merchant_gets_a_json_number() {
        let format =
            WireFormat::resolve(&profile("LeisureLink Digital Limited", "o_G0JIzzJLditvj"));
        assert!(!format.amount_as_string);
        let built = build_success_payload(&transaction(), &format, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["amount"], serde_json::json!(1500));
    }

    #[test]
    fn default_amount_is_a_string() {
        let format = WireFormat::resolve(&profile("Acme Games", "secret-a"));
        let built = build_success_payload(&transaction(), &format, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["amount"], serde_json::json!("1500"));
    }

    #[test]
    fn app_credentials_included_only_when_flagged() {
        let plain = WireFormat::resolve(&profile("Acme Games", "secret-a"));
        let built = build_success_payload(&transaction(), &plain, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert!(value.get("app_id").is_none());
        assert!(value.get("client_appkey").is_none());

        let flagged = WireFormat::resolve(&profile(
            "Zingplay International PTE,. LTD",
            "9qyxr81YWU2BNlO",
        ));
        let built = build_success_payload(&transaction(), &flagged, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["app_id"], serde_json::json!("app-1"));
        assert_eq!(value["client_appkey"], serde_json::json!("key-1"));
    }

    #[test]
    fn legacy_allow_list_matches_name_or_secret() {
        assert_eq!(
            WireFormat::resolve(&profile("PM Max", "whatever")).schema,
            SchemaVariant::Legacy
        );
        assert_eq!(
            WireFormat::resolve(&profile("whoever", "71mczdtiyfaunj5")).schema,
            SchemaVariant::Legacy
        );
        assert_eq!(
            WireFormat::resolve(&profile("Acme Games", "secret-a")).schema,
            SchemaVariant::Current
        );
    }

    #[test]
    fn legacy_success_carries_the_extended_field_set() {
        let format = WireFormat::resolve(&profile("Coda", "71mczdtiyfaunj5"));
        let built = build_success_payload(&transaction(), &format, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["user_ip"], serde_json::json!("10.0.0.5"));
        assert_eq!(value["user_mdn"], serde_json::json!("66810000001"));
        assert_eq!(value["status_code"], serde_json::json!("1000"));
        assert_eq!(value["status"], serde_json::json!("success"));
        assert_eq!(value["amount"], serde_json::json!(1500));
        assert_eq!(value["charging_amount"], serde_json::json!("1650"));
        assert_eq!(value["updated_at"], serde_json::json!(at().timestamp().to_string()));
        assert_eq!(value["reference_id"], serde_json::json!("ref-1"));
        assert_eq!(value["testing"], serde_json::json!("0"));
        assert_eq!(value["transaction_description"], serde_json::json!(""));
        assert!(value.get("fail_reason").is_none());
    }

    #[test]
    fn legacy_failure_swaps_charging_amount_for_fail_reason() {
        let mut tx = transaction();
        tx.status_code = 1005;
        let format = WireFormat::resolve(&profile("TutuReels", "UPF6qN7b2nP5geg"));
        let built = build_failure_payload(&tx, &format, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["status_code"], serde_json::json!("1005"));
        assert_eq!(value["status"], serde_json::json!("failed"));
        assert_eq!(value["fail_reason"], serde_json::json!("failed"));
        assert!(value.get("charging_amount").is_none());
        assert_eq!(built.notify_status, TransactionStatus::Failed);
    }

    #[test]
    fn current_failure_keeps_the_transaction_status() {
        let mut tx = transaction();
        tx.status_code = 1005;
        let format = WireFormat::resolve(&profile("Acme Games", "secret-a"));
        let built = build_failure_payload(&tx, &format, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["status_code"], serde_json::json!(1005));
        assert_eq!(value["status"], serde_json::json!("failed"));
        assert_eq!(built.notify_status, TransactionStatus::Failed);
    }

    #[test]
    fn pending_failure_uses_the_pending_label() {
        let mut tx = transaction();
        tx.status_code = 1001;
        let format = WireFormat::resolve(&profile("Acme Games", "secret-a"));
        let built = build_failure_payload(&tx, &format, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["status"], serde_json::json!("pending"));
        assert_eq!(built.notify_status, TransactionStatus::Created);
    }

    #[test]
    fn unknown_status_is_a_build_error() {
        let mut tx = transaction();
        tx.status_code = 4242;
        let format = WireFormat::resolve(&profile("Acme Games", "secret-a"));
        let err = build_failure_payload(&tx, &format, at()).unwrap_err();
        assert!(matches!(err, PayloadError::UnknownStatus { code: 4242 }));
    }

    #[test]
    fn qris_alias_applies_only_to_the_flagged_merchant() {
        let mut tx = transaction();
        tx.payment_method = "qris".to_string();

        let higo = WireFormat::resolve(&profile("HIGO GAME PTE LTD", "secret-h"));
        let built = build_success_payload(&tx, &higo, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["payment_method"], serde_json::json!("qr"));

        let other = WireFormat::resolve(&profile("Acme Games", "secret-a"));
        let built = build_success_payload(&tx, &other, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["payment_method"], serde_json::json!("qris"));
    }

    #[test]
    fn provider_reference_secret_swaps_reference_id() {
        let format = WireFormat::resolve(&profile("Acme Games", "08gf6K6t7cRdvoM"));
        assert!(format.reference_from_provider);
        let built = build_success_payload(&transaction(), &format, at()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built.body).unwrap();
        assert_eq!(value["reference_id"], serde_json::json!("prov-9"));
    }

    #[test]
    fn building_twice_is_byte_identical() {
        let format = WireFormat::resolve(&profile("Coda", "71mczdtiyfaunj5"));
        let when = at();
        let first = build_success_payload(&transaction(), &format, when).unwrap();
        let second = build_success_payload(&transaction(), &format, when).unwrap();
        assert_eq!(first.body, second.body);
    }
}
