// flowgate-config/src/config.rs
// ============================================================================
// Module: Environment Configuration
// Description: Loads and validates the process environment-key surface
//              (spec §6 "Configuration (environment-like keys)").
// Purpose: Fail closed on a missing secret or an unparsable address rather
//          than letting the server start half-configured.
// Dependencies: std::env
// ============================================================================

//! ## Overview
//! Every key is read once, at process start, by [`FlowgateConfig::load`].
//! `API_KEY_HMAC_SECRET` and `APPROVAL_HMAC_SECRET` are the only keys the
//! server cannot run without; everything else has a defined fallback. Tests
//! build a [`FlowgateConfig`] directly rather than through the environment.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Environment variable carrying the gateway's API-key hashing secret.
pub const API_KEY_HMAC_SECRET_VAR: &str = "API_KEY_HMAC_SECRET";
/// Environment variable carrying the approval ledger's token-signing secret.
pub const APPROVAL_HMAC_SECRET_VAR: &str = "APPROVAL_HMAC_SECRET";
/// Environment variable carrying the sqlite database DSN.
pub const DB_DSN_VAR: &str = "DB_DSN";
/// Environment variable carrying the auth collaborator's base URL.
pub const AUTH_GRPC_ADDR_VAR: &str = "AUTH_GRPC_ADDR";
/// Environment variable carrying the distributed bus/dedup backend address.
pub const REDIS_ADDR_VAR: &str = "REDIS_ADDR";
/// Environment variable carrying the ledger collaborator's address.
pub const LEDGER_GRPC_ADDR_VAR: &str = "LEDGER_GRPC_ADDR";
/// Environment variable carrying comma-separated allow-listed CORS origins.
pub const CORS_ALLOWED_ORIGINS_VAR: &str = "CORS_ALLOWED_ORIGINS";
/// Environment variable carrying the OTLP exporter endpoint.
pub const OTEL_EXPORTER_OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Environment variable carrying the HTTP listener's bind address. Not part
/// of spec §6's named key surface; `flowgate-server` needs somewhere to
/// listen, so this follows the same `require-or-default` shape as the rest
/// of the optional keys.
pub const BIND_ADDR_VAR: &str = "BIND_ADDR";
/// Bind address used when `BIND_ADDR` is unset.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default auth-validation request timeout when none is configurable
/// through the environment (spec doesn't expose a separate timeout key).
pub const DEFAULT_AUTH_REQUEST_TIMEOUT_MS: u64 = 2_000;

/// Errors raised while loading or validating process configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable was absent.
    #[error("missing required environment variable: {0}")]
    Missing(String),
    /// An environment variable was present but held invalid data.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct FlowgateConfig {
    /// Secret used to compute `key_hash = HMAC_SHA256(secret, raw_key)`.
    pub api_key_hmac_secret: Vec<u8>,
    /// Secret used to sign and verify approval resume tokens.
    pub approval_hmac_secret: Vec<u8>,
    /// Path to the sqlite database file backing the run store and ledger.
    pub db_path: PathBuf,
    /// Address the HTTP listener binds to.
    pub bind_addr: String,
    /// Base URL of the auth-validation collaborator.
    pub auth_base_url: String,
    /// Allow-listed CORS origins for the public emit endpoint.
    pub cors_allowed_origins: Vec<String>,
    /// Distributed bus/dedup backend address, accepted for forward
    /// compatibility with a future Redis-backed `StreamBus`/`DedupStore`.
    pub redis_addr: Option<String>,
    /// Ledger collaborator address, accepted for forward compatibility with
    /// a future out-of-process ledger; this revision's ledger is in-process.
    pub ledger_grpc_addr: Option<String>,
    /// OTLP exporter endpoint, threaded through as an opaque string.
    pub otel_exporter_otlp_endpoint: Option<String>,
}

impl FlowgateConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required key is absent, or
    /// [`ConfigError::Invalid`] when a present key cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let api_key_hmac_secret = read_secret(API_KEY_HMAC_SECRET_VAR)?;
        let approval_hmac_secret = read_secret(APPROVAL_HMAC_SECRET_VAR)?;
        let db_path = parse_db_dsn(&require_var(DB_DSN_VAR)?)?;
        let bind_addr = optional_var(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let auth_base_url = parse_base_url(AUTH_GRPC_ADDR_VAR, &require_var(AUTH_GRPC_ADDR_VAR)?)?;
        let cors_allowed_origins = parse_cors_origins(env::var(CORS_ALLOWED_ORIGINS_VAR).ok().as_deref())?;
        let redis_addr = optional_var(REDIS_ADDR_VAR);
        let ledger_grpc_addr = optional_var(LEDGER_GRPC_ADDR_VAR);
        let otel_exporter_otlp_endpoint = optional_var(OTEL_EXPORTER_OTLP_ENDPOINT_VAR);

        let config = Self {
            api_key_hmac_secret,
            approval_hmac_secret,
            db_path,
            bind_addr,
            auth_base_url,
            cors_allowed_origins,
            redis_addr,
            ledger_grpc_addr,
            otel_exporter_otlp_endpoint,
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-validates a configuration built directly (e.g. in tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a field fails validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key_hmac_secret.is_empty() {
            return Err(ConfigError::Invalid(format!("{API_KEY_HMAC_SECRET_VAR} must be non-empty")));
        }
        if self.approval_hmac_secret.is_empty() {
            return Err(ConfigError::Invalid(format!("{APPROVAL_HMAC_SECRET_VAR} must be non-empty")));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!("{DB_DSN_VAR} must resolve to a non-empty path")));
        }
        self.bind_addr.parse::<std::net::SocketAddr>().map_err(|_| ConfigError::Invalid(format!("{BIND_ADDR_VAR} must be a valid socket address: {}", self.bind_addr)))?;
        validate_base_url(AUTH_GRPC_ADDR_VAR, &self.auth_base_url)?;
        for origin in &self.cors_allowed_origins {
            validate_origin(origin)?;
        }
        if let Some(addr) = &self.ledger_grpc_addr {
            validate_base_url(LEDGER_GRPC_ADDR_VAR, addr)?;
        }
        Ok(())
    }
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name.to_string()))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn read_secret(name: &str) -> Result<Vec<u8>, ConfigError> {
    let value = require_var(name)?;
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{name} must be non-empty")));
    }
    Ok(value.into_bytes())
}

/// Accepts a bare filesystem path or a `sqlite://`-prefixed DSN.
fn parse_db_dsn(raw: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{DB_DSN_VAR} must be non-empty")));
    }
    let path = trimmed.strip_prefix("sqlite://").unwrap_or(trimmed);
    if path.is_empty() {
        return Err(ConfigError::Invalid(format!("{DB_DSN_VAR} must name a database file")));
    }
    Ok(PathBuf::from(path))
}

fn parse_base_url(var_name: &str, raw: &str) -> Result<String, ConfigError> {
    let mut trimmed = raw.trim().to_string();
    validate_base_url(var_name, &trimmed)?;
    let len = trimmed.trim_end_matches('/').len();
    trimmed.truncate(len);
    Ok(trimmed)
}

fn validate_base_url(var_name: &str, value: &str) -> Result<(), ConfigError> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!("{var_name} must start with http:// or https://")));
    }
    Ok(())
}

fn parse_cors_origins(raw: Option<&str>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = raw else { return Ok(Vec::new()) };
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            validate_origin(origin)?;
            Ok(origin.to_string())
        })
        .collect()
}

fn validate_origin(origin: &str) -> Result<(), ConfigError> {
    if !(origin.starts_with("http://") || origin.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!("{CORS_ALLOWED_ORIGINS_VAR} entry must start with http:// or https://: {origin}")));
    }
    Ok(())
}
