//! Integration tests for the admin re-enqueue endpoint
//!
//! Tests cover:
//! - Success envelope for an accepted re-enqueue
//! - Error mapping: unknown, ineligible, in-flight and saturated cases
//! - Request ID propagation into error bodies
//! - Path parameter validation

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use Pulsegate_backend::api::admin::{requeue_callback, AdminState};
use Pulsegate_backend::callbacks::{
    CallbackEngine, CallbackKind, DeliveryJob, DeliveryQueue, InFlightGuard, MerchantApp,
    MerchantDirectory, MerchantProfile, StoreError, Transaction, TransactionStatus,
    TransactionStore,
};
use Pulsegate_backend::error::ErrorCode;
use Pulsegate_backend::middleware::error::ErrorResponse;

// ---------------------------------------------------------------------------
// Minimal fakes
// ---------------------------------------------------------------------------

struct FixedStore {
    transactions: Mutex<HashMap<String, Transaction>>,
}

impl FixedStore {
    fn new(transactions: Vec<Transaction>) -> Self {
        let map = transactions
            .into_iter()
            .map(|tx| (tx.id.clone(), tx))
            .collect();
        FixedStore {
            transactions: Mutex::new(map),
        }
    }
}

#[async_trait]
impl TransactionStore for FixedStore {
    async fn find_awaiting_success_callback(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(Vec::new())
    }

    async fn find_awaiting_failure_callback(
        &self,
        _window: Duration,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(Vec::new())
    }

    async fn find_by_id(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .get(transaction_id)
            .cloned())
    }

    async fn record_callback_outcome(
        &self,
        _transaction_id: &str,
        _status: TransactionStatus,
        _callback_at: Option<DateTime<Utc>>,
        _result: &str,
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

struct FixedDirectory {
    profile: MerchantProfile,
}

#[async_trait]
impl MerchantDirectory for FixedDirectory {
    async fn find_by_app(
        &self,
        _app_key: &str,
        _app_id: &str,
    ) -> Result<Option<MerchantProfile>, StoreError> {
        Ok(Some(self.profile.clone()))
    }
}

// ---------------------------------------------------------------------------
// Test app
// ---------------------------------------------------------------------------

struct AdminHarness {
    app: Router,
    engine: Arc<CallbackEngine>,
    guard: Arc<InFlightGuard>,
    _success_rx: mpsc::Receiver<DeliveryJob>,
    _failure_rx: mpsc::Receiver<DeliveryJob>,
}

fn create_test_app(transactions: Vec<Transaction>, queue_capacity: usize) -> AdminHarness {
    let store = Arc::new(FixedStore::new(transactions));
    let directory = Arc::new(FixedDirectory {
        profile: MerchantProfile {
            merchant_id: 7,
            name: "Acme Games".to_string(),
            secret: "s3cr3t-alpha".to_string(),
            callback_url: "https://merchant.example/cb".to_string(),
            fail_callback: false,
            apps: vec![MerchantApp {
                app_id: "app-1".to_string(),
                app_key: "key-1".to_string(),
                callback_url: String::new(),
            }],
        },
    });
    let guard = Arc::new(InFlightGuard::new(Duration::from_secs(1800)));
    let (success_queue, success_rx) = DeliveryQueue::bounded(CallbackKind::Success, queue_capacity);
    let (failure_queue, failure_rx) = DeliveryQueue::bounded(CallbackKind::Failure, queue_capacity);
    let engine = Arc::new(CallbackEngine::new(
        store,
        directory,
        guard.clone(),
        success_queue,
        failure_queue,
        Duration::from_secs(24 * 3600),
    ));
    let app = Router::new()
        .route(
            "/admin/callbacks/{transaction_id}/requeue",
            post(requeue_callback),
        )
        .with_state(AdminState {
            engine: engine.clone(),
        });
    AdminHarness {
        app,
        engine,
        guard,
        _success_rx: success_rx,
        _failure_rx: failure_rx,
    }
}

fn make_transaction(id: &str, status: TransactionStatus) -> Transaction {
    Transaction {
        id: id.to_string(),
        merchant_tx_id: format!("MTX-{id}"),
        status_code: status.code(),
        payment_method: "DANA".to_string(),
        amount: 15000,
        charged_amount: 16500,
        currency: "IDR".to_string(),
        item_id: "diamond-pack-1".to_string(),
        item_name: "Diamond Pack".to_string(),
        user_id: "user-77".to_string(),
        user_ip: "10.1.2.3".to_string(),
        user_mdn: "628123456789".to_string(),
        app_id: "app-1".to_string(),
        app_key: "key-1".to_string(),
        merchant_name: "Acme Games".to_string(),
        provider_reference: "PRV-123".to_string(),
        callback_reference: "REF-900".to_string(),
        notification_url: String::new(),
        callback_at: None,
        callback_result: "failed".to_string(),
        created_at: Utc::now(),
    }
}

async fn post_requeue(app: &Router, transaction_id: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/admin/callbacks/{transaction_id}/requeue"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requeue_completed_transaction_returns_success_envelope() {
    let harness = create_test_app(
        vec![make_transaction("tx-1", TransactionStatus::Completed)],
        16,
    );

    let (status, body) = post_requeue(&harness.app, "tx-1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"].as_bool(), Some(true));
    assert_eq!(body["data"]["transaction_id"].as_str(), Some("tx-1"));
    assert_eq!(body["data"]["queued"].as_bool(), Some(true));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn requeue_unknown_transaction_returns_not_found() {
    let harness = create_test_app(Vec::new(), 16);

    let (status, body) = post_requeue(&harness.app, "ghost").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let parsed: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(parsed.error, ErrorCode::TransactionNotFound);
    assert!(parsed.message.contains("ghost"));
    assert_eq!(parsed.retryable, Some(false));
}

#[tokio::test]
async fn requeue_pending_transaction_is_unprocessable() {
    let harness = create_test_app(
        vec![make_transaction("tx-early", TransactionStatus::Created)],
        16,
    );

    let (status, body) = post_requeue(&harness.app, "tx-early").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["error"].as_str(),
        Some("TRANSACTION_NOT_REDELIVERABLE")
    );
}

#[tokio::test]
async fn requeue_while_delivery_in_flight_conflicts() {
    let harness = create_test_app(
        vec![make_transaction("tx-busy", TransactionStatus::Completed)],
        16,
    );
    assert!(harness.guard.try_acquire("tx-busy"));

    let (status, body) = post_requeue(&harness.app, "tx-busy").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"].as_str(), Some("CALLBACK_IN_FLIGHT"));
}

#[tokio::test]
async fn saturated_queue_returns_retryable_service_unavailable() {
    let harness = create_test_app(
        vec![
            make_transaction("tx-a", TransactionStatus::Completed),
            make_transaction("tx-b", TransactionStatus::Completed),
        ],
        1,
    );
    harness.engine.requeue_transaction("tx-a").await.unwrap();

    let (status, body) = post_requeue(&harness.app, "tx-b").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"].as_str(), Some("QUEUE_SATURATED"));
    assert_eq!(body["retryable"].as_bool(), Some(true));
}

#[tokio::test]
async fn request_id_header_is_echoed_in_error_body() {
    let harness = create_test_app(Vec::new(), 16);

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/callbacks/ghost/requeue")
                .header("x-request-id", "req-abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["request_id"].as_str(), Some("req-abc-123"));
}

#[tokio::test]
async fn blank_transaction_id_is_rejected() {
    let harness = create_test_app(Vec::new(), 16);

    let (status, body) = post_requeue(&harness.app, "%20").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str(), Some("VALIDATION_ERROR"));
}
