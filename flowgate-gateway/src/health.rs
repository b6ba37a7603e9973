// flowgate-gateway/src/health.rs
// ============================================================================
// Module: Ingestion Gateway Health
// Description: Liveness and readiness probes (spec §9 wiring).
// Purpose: Let an orchestrator distinguish "process is up" from "process has
//          finished opening its stores and is ready for traffic".
// Dependencies: axum
// ============================================================================

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde_json::json;

/// Liveness probe: always `200` once the router is mounted.
pub async fn handle_healthz() -> Response {
    (StatusCode::OK, axum::Json(json!({ "status": "ok" }))).into_response()
}

/// Readiness probe. `flowgate-server` only mounts the router after every
/// collaborator (stores, bus, engine) has been constructed successfully, so
/// readiness and liveness coincide in this revision — there's no lazily
/// initialized dependency to poll separately.
pub async fn handle_readyz() -> Response {
    (StatusCode::OK, axum::Json(json!({ "status": "ready" }))).into_response()
}
