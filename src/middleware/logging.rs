//! Request ID generation and request/response logging
//!
//! Every request gets a UUID v4 `x-request-id` (generated by the
//! `SetRequestIdLayer`, echoed back by the `PropagateRequestIdLayer`) and a
//! single structured log line with method, path, status and latency.

#[cfg(feature = "database")]
use axum::{extract::Request, middleware::Next, response::Response};
#[cfg(feature = "database")]
use http::HeaderValue;
#[cfg(feature = "database")]
use std::time::Instant;
#[cfg(feature = "database")]
use tower_http::request_id::{MakeRequestId, RequestId};
#[cfg(feature = "database")]
use tracing::{error, info, warn};
#[cfg(feature = "database")]
use uuid::Uuid;

/// Generates a UUID v4 request ID for every incoming request
#[cfg(feature = "database")]
#[derive(Clone, Copy, Default)]
pub struct UuidRequestId;

#[cfg(feature = "database")]
impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Log one line per request with method, path, status and latency
#[cfg(feature = "database")]
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            elapsed_ms,
            request_id = %request_id,
            "Request failed"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            elapsed_ms,
            request_id = %request_id,
            "Request rejected"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            elapsed_ms,
            request_id = %request_id,
            "Request completed"
        );
    }

    response
}

#[cfg(all(test, feature = "database"))]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_request_ids_are_unique() {
        let mut make = UuidRequestId;
        let request = http::Request::builder().body(()).unwrap();

        let first = make.make_request_id(&request).unwrap();
        let second = make.make_request_id(&request).unwrap();

        assert_ne!(first.header_value(), second.header_value());
    }

    #[test]
    fn test_uuid_request_id_is_valid_header_value() {
        let mut make = UuidRequestId;
        let request = http::Request::builder().body(()).unwrap();

        let id = make.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();

        assert_eq!(value.len(), 36);
        assert!(Uuid::parse_str(value).is_ok());
    }
}
