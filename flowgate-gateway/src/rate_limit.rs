// flowgate-gateway/src/rate_limit.rs
// ============================================================================
// Module: Ingestion Gateway Rate Limiting
// Description: Fixed 60-second window counter keyed by a salted key hash.
// Purpose: Implement the per-key admission control spec §4.3 requires before
//          any dedup or publish work runs.
// Dependencies: std::sync::Mutex
// ============================================================================

//! ## Overview
//! One counter per key hash, reset whenever the window has elapsed. This is
//! a fixed-window limiter, not a sliding one: a caller can burst up to twice
//! its quota across a window boundary. That is an accepted simplification
//! for a reference gateway (spec gives no sliding-window requirement).

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// The fixed `Retry-After` hint spec §4.3 mandates on rejection.
pub const RETRY_AFTER_SECS: u64 = 60;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Admitted; the caller's counter was incremented.
    Allow,
    /// Rejected; retry after [`RETRY_AFTER_SECS`] seconds.
    Limited,
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// Per-key-hash fixed-window rate limiter.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<BTreeMap<String, Window>>,
}

impl RateLimiter {
    /// Builds an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks and, on admission, consumes one unit of `key`'s quota.
    #[must_use]
    pub fn check(&self, key: &str, quota: u32) -> RateLimitDecision {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            return RateLimitDecision::Limited;
        };
        let window = windows.entry(key.to_string()).or_insert_with(|| Window { started_at: now, count: 0 });
        if now.duration_since(window.started_at) >= WINDOW {
            window.started_at = now;
            window.count = 0;
        }
        if window.count >= quota {
            return RateLimitDecision::Limited;
        }
        window.count += 1;
        RateLimitDecision::Allow
    }
}
