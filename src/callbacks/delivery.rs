//! Signed HTTP delivery to merchant endpoints.
//!
//! A delivery is one POST of the prepared body with its `bodysign` header.
//! Only HTTP 200 counts as delivered; every other status and any transport
//! error is a failed attempt the worker may retry. Responses are read under
//! a byte cap and decoded by declared content type, so a misbehaving
//! merchant endpoint can neither balloon memory nor fail the attempt just
//! by answering with HTML.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::warn;

use crate::callbacks::signing::{sign_body, SIGNATURE_HEADER};
use crate::callbacks::types::DeliveryJob;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to build callback http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("callback transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("merchant rejected callback with status {status}")]
    Rejected { status: StatusCode, response: Value },
}

/// Outcome of an acknowledged delivery.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Taken just before the POST went out; recorded as the callback
    /// timestamp.
    pub acked_at: DateTime<Utc>,
    /// The response body's `result` field, or `ok` when absent.
    pub merchant_result: String,
    pub response: Value,
}

/// Shared HTTP client for merchant callbacks.
#[derive(Clone)]
pub struct CallbackHttpClient {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl CallbackHttpClient {
    pub fn new(timeout: Duration, max_response_bytes: usize) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeliveryError::Client)?;
        Ok(CallbackHttpClient {
            client,
            max_response_bytes,
        })
    }

    /// POST the job body, signed, and interpret the merchant's answer.
    pub async fn deliver(&self, job: &DeliveryJob) -> Result<DeliveryReceipt, DeliveryError> {
        let signature = sign_body(&job.body, &job.secret);
        let acked_at = Utc::now();

        let response = self
            .client
            .post(&job.url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(job.body.clone())
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = self.read_capped(response).await;
        let decoded = decode_response_body(&bytes, &content_type);

        if status != StatusCode::OK {
            return Err(DeliveryError::Rejected {
                status,
                response: decoded,
            });
        }

        let merchant_result = extract_merchant_result(&decoded);
        Ok(DeliveryReceipt {
            acked_at,
            merchant_result,
            response: decoded,
        })
    }

    /// Read at most `max_response_bytes` of the body. Read errors after a
    /// 200 status do not fail the delivery; the merchant already accepted
    /// the callback.
    async fn read_capped(&self, mut response: reqwest::Response) -> Vec<u8> {
        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let remaining = self.max_response_bytes.saturating_sub(body.len());
                    if remaining == 0 {
                        warn!(
                            cap_bytes = self.max_response_bytes,
                            "merchant response exceeded cap, truncating"
                        );
                        break;
                    }
                    body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to read merchant response body");
                    break;
                }
            }
        }
        body
    }
}

/// Decode a response body by its declared content type. JSON bodies are
/// parsed; everything else (and unparseable JSON) is wrapped as a
/// diagnostic object instead of an error.
fn decode_response_body(bytes: &[u8], content_type: &str) -> Value {
    if content_type.to_lowercase().contains("application/json") {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => value,
            Err(_) => json!({ "raw_body": String::from_utf8_lossy(bytes) }),
        }
    } else {
        json!({
            "raw_body": String::from_utf8_lossy(bytes),
            "content_type": content_type,
        })
    }
}

/// The result string recorded against the transaction: the response's
/// `result` field when present and non-null, otherwise `ok`.
fn extract_merchant_result(response: &Value) -> String {
    match response.get("result") {
        None | Some(Value::Null) => "ok".to_string(),
        Some(Value::String(result)) => result.clone(),
        Some(other) => other.to_string(),
    }
}
