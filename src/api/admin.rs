//! Operator endpoints for the callback engine
//!
//! Re-enqueueing is deliberate and explicit: the discovery sweeps never pick
//! a transaction back up once its callback result is `failed`, so support
//! staff resolve merchant-side incidents through this endpoint after the
//! merchant confirms their listener is reachable again.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::info;

use crate::callbacks::CallbackEngine;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::middleware::error::{get_request_id_from_headers, success_response};

#[derive(Clone)]
pub struct AdminState {
    pub engine: Arc<CallbackEngine>,
}

/// POST /admin/callbacks/{transaction_id}/requeue
///
/// Queues the success callback of a completed transaction for another
/// delivery round, regardless of how many attempts were burned before.
pub async fn requeue_callback(
    State(state): State<AdminState>,
    Path(transaction_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);

    if transaction_id.trim().is_empty() {
        return Err(with_request_id(
            AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
                field: "transaction_id".to_string(),
            })),
            &request_id,
        ));
    }

    info!(transaction_id = %transaction_id, "Manual callback re-enqueue requested");

    state
        .engine
        .requeue_transaction(&transaction_id)
        .await
        .map_err(|err| with_request_id(AppError::from(err), &request_id))?;

    info!(transaction_id = %transaction_id, "Success callback queued for re-delivery");

    Ok(success_response(serde_json::json!({
        "transaction_id": transaction_id,
        "queued": true,
    })))
}

fn with_request_id(error: AppError, request_id: &Option<String>) -> AppError {
    match request_id {
        Some(id) => error.with_request_id(id),
        None => error,
    }
}
