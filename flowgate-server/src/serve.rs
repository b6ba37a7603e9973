// flowgate-server/src/serve.rs
// ============================================================================
// Module: Serve Command
// Description: Builds every collaborator (spec §9) and runs the gateway and
//              runtime worker under one graceful-shutdown drain.
// Purpose: The only place in the binary that knows the concrete types behind
//          `RunStore`/`LedgerClient`/`ApprovalSigner`.
// Dependencies: flowgate-bus, flowgate-config, flowgate-core, flowgate-gateway,
//               flowgate-ledger, flowgate-providers, flowgate-runtime,
//               flowgate-store, tokio
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use flowgate_bus::InMemoryDedupStore;
use flowgate_bus::InMemoryStreamBus;
use flowgate_config::FlowgateConfig;
use flowgate_core::engine::FlowEngine;
use flowgate_gateway::GatewayConfig;
use flowgate_gateway::GatewayState;
use flowgate_gateway::auth::HttpAuthValidator;
use flowgate_ledger::HmacApprovalSigner;
use flowgate_ledger::SqliteLedgerStore;
use flowgate_runtime::Dispatcher;
use flowgate_runtime::Supervisor;
use flowgate_runtime::WorkerConfig;
use flowgate_store::SqliteRunStore;
use flowgate_store::SqliteStoreConfig;
use thiserror::Error;

use crate::audit::StderrAuditSink;

/// Duration the HTTP listener grants an in-flight request to finish once
/// shutdown begins (spec §5 "graceful shutdown drains for 15 s").
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(15);

/// Default outbound auth-validation request timeout (spec has no separate
/// key for this; `flowgate-config` names the same default).
const AUTH_REQUEST_TIMEOUT: Duration = Duration::from_millis(flowgate_config::config::DEFAULT_AUTH_REQUEST_TIMEOUT_MS);

/// Errors that can prevent `serve` from starting or from shutting down
/// cleanly. Every variant maps to exit code `1` (spec §6); a clean shutdown
/// never constructs one of these.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] flowgate_config::ConfigError),
    /// A sqlite store could not be opened.
    #[error("store error: {0}")]
    Store(String),
    /// A collaborator with an outbound HTTP client could not be built.
    #[error("collaborator init failed: {0}")]
    Collaborator(String),
    /// The HTTP listener could not bind its configured address.
    #[error("bind failed: {0}")]
    Bind(String),
    /// The HTTP server exited with an error.
    #[error("server error: {0}")]
    Server(String),
}

type Engine = FlowEngine<SqliteRunStore, SqliteLedgerStore, HmacApprovalSigner>;

/// Loads configuration from the environment, builds every collaborator, and
/// serves the gateway's HTTP surface and the runtime's stream workers until
/// `shutdown` resolves, draining in-flight work for [`SHUTDOWN_DRAIN`].
///
/// # Errors
///
/// Returns [`ServeError`] on a configuration, store, bind, or server
/// failure. Any such failure is fatal; the caller exits `1`.
pub async fn serve(shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<(), ServeError> {
    let config = FlowgateConfig::load()?;
    run(config, shutdown).await
}

/// Testable core of [`serve`], taking an already-built [`FlowgateConfig`]
/// instead of reading the environment.
async fn run(config: FlowgateConfig, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<(), ServeError> {
    let audit: Arc<dyn flowgate_core::interfaces::AuditSink> = Arc::new(StderrAuditSink);

    let run_store = Arc::new(SqliteRunStore::open(&SqliteStoreConfig::new(config.db_path.clone())).map_err(|err| ServeError::Store(err.to_string()))?);
    let ledger_store = Arc::new(SqliteLedgerStore::open(&config.db_path).map_err(|err| ServeError::Store(err.to_string()))?);
    let signer = Arc::new(HmacApprovalSigner::new(config.approval_hmac_secret.clone()));

    let registry = flowgate_providers::registry::build_default_registry(audit.clone(), false, None).map_err(|err| ServeError::Collaborator(err.to_string()))?;
    let engine: Arc<Engine> = Arc::new(FlowEngine::new(registry, Arc::clone(&run_store), Arc::clone(&ledger_store), Arc::clone(&signer)));

    let bus: Arc<dyn flowgate_core::interfaces::StreamBus> = Arc::new(InMemoryStreamBus::new());
    let dedup: Arc<dyn flowgate_core::interfaces::DedupStore> = Arc::new(InMemoryDedupStore::new());
    let auth: Arc<dyn flowgate_core::interfaces::AuthValidator> =
        Arc::new(HttpAuthValidator::new(config.auth_base_url.clone(), AUTH_REQUEST_TIMEOUT).map_err(|err| ServeError::Collaborator(err.to_string()))?);

    let gateway_config = {
        let mut gateway_config = GatewayConfig::new(config.api_key_hmac_secret.clone());
        gateway_config.cors_allowed_origins = config.cors_allowed_origins.clone();
        gateway_config
    };
    let gateway_state =
        Arc::new(GatewayState::new(Arc::clone(&bus), Arc::clone(&dedup), auth, Arc::clone(&run_store), Arc::clone(&engine), audit.clone(), gateway_config));
    let app = flowgate_gateway::build_router(gateway_state);

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&run_store), Arc::clone(&engine), audit.clone(), 64));
    let worker_config = WorkerConfig::new("flowgate-runtime", "flowgate-server");
    let runtime_handle = Supervisor::new(Arc::clone(&bus), dispatcher, audit, worker_config).spawn();

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.map_err(|err| ServeError::Bind(err.to_string()))?;
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown);
    let server_result = server.await.map_err(|err| ServeError::Server(err.to_string()));

    tokio::time::timeout(SHUTDOWN_DRAIN, runtime_handle.shutdown()).await.ok();
    server_result
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use tokio::sync::oneshot;

    use super::*;

    fn test_config(db_path: std::path::PathBuf) -> FlowgateConfig {
        FlowgateConfig {
            api_key_hmac_secret: b"test-api-key-secret".to_vec(),
            approval_hmac_secret: b"test-approval-secret".to_vec(),
            db_path,
            bind_addr: "127.0.0.1:0".to_string(),
            auth_base_url: "http://127.0.0.1:9".to_string(),
            cors_allowed_origins: Vec::new(),
            redis_addr: None,
            ledger_grpc_addr: None,
            otel_exporter_otlp_endpoint: None,
        }
    }

    #[tokio::test]
    async fn run_shuts_down_cleanly_when_signalled_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().join("flowgate.db"));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        shutdown_tx.send(()).unwrap();
        let result = run(config, async move {
            let _ = shutdown_rx.await;
        })
        .await;
        assert!(result.is_ok());
    }
}
