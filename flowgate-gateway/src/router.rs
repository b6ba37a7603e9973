// flowgate-gateway/src/router.rs
// ============================================================================
// Module: Ingestion Gateway Router
// Description: Wires the emit and resume routes behind the CORS middleware.
// Purpose: Single entry point flowgate-server uses to mount the gateway onto
//          its axum app.
// Dependencies: axum
// ============================================================================

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use flowgate_core::interfaces::ApprovalSigner;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::RunStore;

use crate::cors::apply_cors;
use crate::emit::handle_emit;
use crate::health::handle_healthz;
use crate::health::handle_readyz;
use crate::resume::handle_resume;
use crate::state::GatewayState;

/// Builds the gateway's axum router: `/v1/events/emit`, `/executions/resume`,
/// and the `/healthz`/`/readyz` probes, with CORS preflight handling
/// layered over the public routes only.
pub fn build_router<St, L, Sig>(state: Arc<GatewayState<St, L, Sig>>) -> Router
where
    St: RunStore + 'static,
    L: LedgerClient + 'static,
    Sig: ApprovalSigner + 'static,
{
    let allowed_origins = Arc::new(state.config.cors_allowed_origins.clone());
    let public_routes = Router::new()
        .route("/v1/events/emit", post(handle_emit::<St, L, Sig>))
        .route("/executions/resume", post(handle_resume::<St, L, Sig>))
        .layer(middleware::from_fn_with_state(allowed_origins, apply_cors))
        .with_state(state);
    Router::new().route("/healthz", get(handle_healthz)).route("/readyz", get(handle_readyz)).merge(public_routes)
}
