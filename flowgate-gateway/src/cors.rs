// flowgate-gateway/src/cors.rs
// ============================================================================
// Module: Ingestion Gateway CORS
// Description: Allow-listed CORS preflight handling (spec §6).
// Purpose: Answer OPTIONS preflights with a 204 and the right
//          `Access-Control-Allow-*` headers, and stamp the same headers on
//          every other response from an allowed origin.
// Dependencies: axum
// ============================================================================

use std::sync::Arc;

use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;

/// Middleware that answers CORS preflights and tags same-origin responses.
pub async fn apply_cors(State(allowed_origins): State<Arc<Vec<String>>>, request: Request, next: Next) -> Response {
    let origin = request.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok()).map(str::to_string);
    let is_allowed = origin.as_deref().is_some_and(|o| allowed_origins.iter().any(|allowed| allowed == o));

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        if is_allowed {
            apply_headers(&mut response, origin.as_deref());
        }
        return response;
    }

    let mut response = next.run(request).await;
    if is_allowed {
        apply_headers(&mut response, origin.as_deref());
    }
    response
}

fn apply_headers(response: &mut Response, origin: Option<&str>) {
    let Some(origin) = origin else { return };
    let Ok(origin_value) = HeaderValue::from_str(origin) else { return };
    response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_value);
    response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST, OPTIONS"));
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("authorization, content-type, x-api-key, idempotency-key"));
}
