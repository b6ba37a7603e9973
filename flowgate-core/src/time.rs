// flowgate-core/src/time.rs
// ============================================================================
// Module: Flowgate Timestamps
// Description: UTC RFC3339 timestamp wrapper and monotonic id minting helpers.
// Purpose: Provide a single serializable time representation for envelopes,
//          executions, and ledger entries.
// Dependencies: time, serde
// ============================================================================

//! ## Overview
//! All wire-visible timestamps are UTC RFC3339 strings. `Timestamp` wraps
//! `time::OffsetDateTime` and serializes through that format so persisted
//! records and HTTP responses agree byte-for-byte.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// UTC timestamp serialized as RFC3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Returns the current UTC time.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Returns the underlying `OffsetDateTime`.
    #[must_use]
    pub const fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }

    /// Returns the timestamp as an RFC3339 string.
    ///
    /// # Panics
    ///
    /// Never panics in practice: `OffsetDateTime` values produced by this
    /// type are always UTC and within the representable RFC3339 range.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        self.0.format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }

    /// Parses an RFC3339 string into a `Timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Parse`] when the string is not valid RFC3339.
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        OffsetDateTime::parse(value, &Rfc3339)
            .map(Self)
            .map_err(|err| TimestampError::Parse(err.to_string()))
    }

    /// Returns true when `self` is strictly before `other`.
    #[must_use]
    pub fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Returns `self` advanced by `duration`, saturating rather than
    /// overflowing for absurdly large durations.
    #[must_use]
    pub fn add_duration(self, duration: std::time::Duration) -> Self {
        let seconds = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        Self(self.0 + time::Duration::seconds(seconds))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(value: Timestamp) -> Self {
        value.to_rfc3339()
    }
}

/// Errors raised while parsing timestamps.
#[derive(Debug, thiserror::Error)]
pub enum TimestampError {
    /// The input string was not valid RFC3339.
    #[error("invalid rfc3339 timestamp: {0}")]
    Parse(String),
}

// ============================================================================
// SECTION: Monotonic Nanos
// ============================================================================

static LAST_NANOS: AtomicU64 = AtomicU64::new(0);

/// Returns a monotonically increasing nanosecond counter seeded from wall
/// clock time, used to mint unique event ids (`evt_<nanos>`).
///
/// Ties within the same nanosecond are broken by bumping the counter, so two
/// calls in quick succession never collide even on coarse-grained clocks.
#[must_use]
pub fn monotonic_unix_nanos() -> u64 {
    let wall = u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos())
        .unwrap_or(u64::from(u32::MAX));
    loop {
        let last = LAST_NANOS.load(Ordering::SeqCst);
        let next = if wall > last { wall } else { last + 1 };
        if LAST_NANOS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            return next;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use super::*;

    #[test]
    fn monotonic_nanos_strictly_increases() {
        let a = monotonic_unix_nanos();
        let b = monotonic_unix_nanos();
        assert!(b > a);
    }

    #[test]
    fn timestamp_round_trips_rfc3339() {
        let ts = Timestamp::now();
        let text = ts.to_rfc3339();
        let parsed = Timestamp::parse(&text).unwrap();
        assert_eq!(ts, parsed);
    }
}
