// flowgate-gateway/src/lib.rs
// ============================================================================
// Crate: flowgate-gateway
// Description: Ingestion gateway (C3) — HTTP surface for event emission and
//              approval resume, wired over the C1/C2/C4 collaborators.
// ============================================================================

//! Exposes `build_router`, the two route handlers it wires, and the
//! supporting auth/rate-limit/audit types. `flowgate-server` owns the HTTP
//! listener, TLS, and graceful shutdown; this crate owns only request
//! handling.

/// Structured audit events emitted by the emit and resume paths.
pub mod audit;
pub mod auth;
/// Allow-listed CORS preflight handling (spec §6).
pub mod cors;
/// POST /v1/events/emit (spec §4.3).
pub mod emit;
/// Liveness and readiness probes (spec §9 wiring).
pub mod health;
/// Shared request/response helpers for the emit and resume routes.
pub mod http;
pub mod rate_limit;
/// POST /executions/resume (spec §4.4.6, §6).
pub mod resume;
/// Wires the emit and resume routes behind the CORS middleware.
pub mod router;
/// Shared, cloneable handle every route handler is generic over.
pub mod state;

pub use router::build_router;
pub use state::GatewayConfig;
pub use state::GatewayState;
