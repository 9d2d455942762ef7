//! Response handling and transformation.
//!
//! # Responsibilities
//! - Build 429 responses for rate-limited requests
//! - Map storage and circuit errors to HTTP status codes
//!
//! # Design Decisions
//! - Error bodies are JSON `{error, message}` plus context fields
//! - `Retry-After` is whole seconds, rounded up so clients never retry early
//! - Dependency timeouts result in 504 Gateway Timeout

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::resilience::CircuitError;
use crate::storage::StorageError;

pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_RATELIMIT_POLICY: HeaderName = HeaderName::from_static("x-ratelimit-policy");

/// Whole seconds a client should wait, rounded up.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    retry_after.as_secs_f64().ceil() as u64
}

/// 429 with `Retry-After` and `X-RateLimit-Reset` (epoch seconds).
pub fn rate_limited(retry_after: Duration) -> Response {
    let secs = retry_after.as_secs_f64();
    let body = json!({
        "error": "Rate limit exceeded",
        "retry_after": secs,
        "message": format!("Please try again in {secs:.1} seconds"),
    });

    let reset_at = SystemTime::now()
        .checked_add(retry_after)
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_at));
    response
}

/// Map a failed storage call to the response the client sees.
pub fn storage_error(err: CircuitError<StorageError>) -> Response {
    match err {
        CircuitError::Open { circuit, retry_after } => {
            let body = json!({
                "error": "Service temporarily unavailable",
                "circuit": circuit,
                "retry_after": retry_after.as_secs_f64(),
                "message": format!(
                    "Storage is recovering, try again in {:.1} seconds",
                    retry_after.as_secs_f64()
                ),
            });
            let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(retry_after)),
            );
            response
        }
        CircuitError::Timeout { timeout, .. } => error_body(
            StatusCode::GATEWAY_TIMEOUT,
            "Storage timeout",
            format!("Storage did not answer within {:.1} seconds", timeout.as_secs_f64()),
        ),
        CircuitError::Failed(err) => {
            let status = match &err {
                StorageError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                StorageError::Connection(_) | StorageError::Unavailable(_) => StatusCode::BAD_GATEWAY,
            };
            error_body(status, status.canonical_reason().unwrap_or("Error"), err.to_string())
        }
    }
}

pub fn error_body(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    let body = json!({ "error": error, "message": message.into() });
    (status, Json(body)).into_response()
}
