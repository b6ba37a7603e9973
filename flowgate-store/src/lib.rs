// flowgate-store/src/lib.rs
// ============================================================================
// Crate: flowgate-store
// Description: Durable SQLite-backed RunStore (flows + flow_executions).
// ============================================================================

//! `SQLite`-backed implementation of `flowgate_core::interfaces::RunStore`.

pub mod store;

pub use store::SqliteRunStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
