// flowgate-runtime/src/lib.rs
// ============================================================================
// Crate: flowgate-runtime
// Description: Flow runtime (C4) stream-consumer worker pool — trigger
//              matching, execution fan-out, and graceful shutdown.
// ============================================================================

//! Tails `zone.*.event.*` topics on the stream bus, matches dequeued events
//! against enabled flows, and drives each match through
//! `flowgate_core::engine::FlowEngine`. One [`worker::Worker`] owns one
//! topic's consumer-group loop; [`supervisor::Supervisor`] discovers topics
//! and keeps a worker running for each one.

/// Structured audit events emitted by the stream-consumer worker.
pub mod audit;
/// Tunables for the stream-consumer worker pool (spec §4.4.1, §5 backpressure).
pub mod config;
pub mod dispatch;
/// Discovers `zone.*.event.*` topics and keeps one Worker per topic alive.
pub mod supervisor;
/// One consumer-group loop over a single topic (spec §4.4.1, §5).
pub mod worker;

pub use config::WorkerConfig;
pub use dispatch::DispatchError;
pub use dispatch::Dispatcher;
pub use supervisor::RuntimeHandle;
pub use supervisor::Supervisor;
pub use worker::Worker;
