// flowgate-gateway/src/state.rs
// ============================================================================
// Module: Ingestion Gateway State
// Description: Shared, cloneable handle every route handler is generic over.
// Purpose: Bundle C1/C2/C3's collaborators plus the C4 engine so the emit and
//          resume handlers can be free functions taking `Arc<GatewayState>`.
// Dependencies: flowgate-core
// ============================================================================

use std::sync::Arc;

use flowgate_core::engine::FlowEngine;
use flowgate_core::interfaces::ApprovalSigner;
use flowgate_core::interfaces::AuditSink;
use flowgate_core::interfaces::AuthValidator;
use flowgate_core::interfaces::DedupStore;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::RunStore;
use flowgate_core::interfaces::StreamBus;

use crate::rate_limit::RateLimiter;

/// Gateway admission-control and crypto configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Secret used to compute `key_hash = HMAC_SHA256(secret, raw_key)`.
    pub api_key_hmac_secret: Vec<u8>,
    /// Maximum accepted request body size in bytes (spec reference: 1 MiB).
    pub max_body_bytes: usize,
    /// Allow-listed CORS origins for the public emit endpoint.
    pub cors_allowed_origins: Vec<String>,
}

/// Reference body size limit (spec §4.3: "1 MiB is the reference limit").
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Dedup TTL for successful ingest responses (spec §4.2: 30 days).
pub const INGEST_DEDUP_TTL: std::time::Duration = std::time::Duration::from_secs(30 * 24 * 60 * 60);

impl GatewayConfig {
    /// Builds a config with the reference body size limit and no allowed
    /// CORS origins (callers opt in explicitly).
    #[must_use]
    pub fn new(api_key_hmac_secret: Vec<u8>) -> Self {
        Self { api_key_hmac_secret, max_body_bytes: DEFAULT_MAX_BODY_BYTES, cors_allowed_origins: Vec::new() }
    }
}

/// Every collaborator an emit or resume request needs, generic over the
/// engine's store/ledger/signer collaborators so the gateway compiles
/// against the same concrete types the runtime worker uses.
pub struct GatewayState<St, L, Sig> {
    /// Stream bus the emit path publishes to.
    pub bus: Arc<dyn StreamBus>,
    /// Dedup store backing idempotent ingest.
    pub dedup: Arc<dyn DedupStore>,
    /// Outbound auth-validation collaborator.
    pub auth: Arc<dyn AuthValidator>,
    /// Flow/execution persistence, shared with the engine.
    pub run_store: Arc<St>,
    /// Flow engine the resume path drives forward.
    pub engine: Arc<FlowEngine<St, L, Sig>>,
    /// Structured audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Per-key-hash admission control.
    pub rate_limiter: RateLimiter,
    /// Crypto and admission configuration.
    pub config: GatewayConfig,
}

impl<St, L, Sig> GatewayState<St, L, Sig>
where
    St: RunStore,
    L: LedgerClient,
    Sig: ApprovalSigner,
{
    /// Builds a new gateway state.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "every field is a distinct required collaborator")]
    pub fn new(
        bus: Arc<dyn StreamBus>,
        dedup: Arc<dyn DedupStore>,
        auth: Arc<dyn AuthValidator>,
        run_store: Arc<St>,
        engine: Arc<FlowEngine<St, L, Sig>>,
        audit: Arc<dyn AuditSink>,
        config: GatewayConfig,
    ) -> Self {
        Self { bus, dedup, auth, run_store, engine, audit, rate_limiter: RateLimiter::new(), config }
    }
}
