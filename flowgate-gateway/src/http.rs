// flowgate-gateway/src/http.rs
// ============================================================================
// Module: Ingestion Gateway HTTP Plumbing
// Description: Shared request/response helpers for the emit and resume routes.
// Purpose: Centralize header extraction and the `{error: {...}}` envelope
//          (spec §7) so both handlers format failures identically.
// Dependencies: axum, flowgate-core
// ============================================================================

use axum::Json;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use flowgate_core::errors::ErrorKind;
use flowgate_core::errors::FlowgateError;
use serde::Serialize;
use serde_json::json;

/// Reads a raw API key from `Authorization: Bearer <key>` or `x-api-key`.
#[must_use]
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        let text = value.to_str().ok()?;
        if let Some(key) = text.strip_prefix("Bearer ") {
            return Some(key.trim().to_string());
        }
    }
    headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(|s| s.trim().to_string())
}

/// Reads the caller-supplied idempotency key from the `Idempotency-Key`
/// header, falling back to the request body's own field.
#[must_use]
pub fn extract_idempotency_key_header(headers: &HeaderMap) -> Option<String> {
    headers.get("idempotency-key").and_then(|v| v.to_str().ok()).map(|s| s.trim().to_string())
}

/// Renders a [`FlowgateError`] as the spec §7 error envelope, attaching a
/// `Retry-After` header when `retry_after_secs` is supplied.
#[must_use]
pub fn error_response(err: &FlowgateError, retry_after_secs: Option<u64>) -> Response {
    let status = StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "error": {
            "code": code_for(err.kind),
            "message": err.message,
            "request_id": err.request_id,
        }
    });
    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = retry_after_secs {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
    }
    response
}

/// Returns the taxonomy code string for `kind` (spec §7 table).
#[must_use]
pub const fn code_for(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::BadRequest => "bad_request",
        ErrorKind::Unauthorized => "unauthorized",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::RateLimited => "rate_limited",
        ErrorKind::Dependency => "dependency",
        ErrorKind::Internal => "internal",
        ErrorKind::Cancelled => "cancelled",
    }
}

/// Renders a successful JSON body with `202 Accepted`.
#[must_use]
pub fn accepted<T: Serialize>(body: &T) -> Response {
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

/// Renders a successful JSON body with `200 OK`.
#[must_use]
pub fn ok<T: Serialize>(body: &T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}
