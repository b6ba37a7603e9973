// flowgate-config/src/lib.rs
// ============================================================================
// Crate: flowgate-config
// Description: Environment-key configuration loading and validation.
// ============================================================================

//! Resolves the process environment-key surface (spec §6) into a single
//! validated [`FlowgateConfig`], failing closed when a required secret is
//! absent or a configured address can't be parsed.

pub mod config;

pub use config::ConfigError;
pub use config::FlowgateConfig;
