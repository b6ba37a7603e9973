// flowgate-core/src/ids.rs
// ============================================================================
// Module: Flowgate Identifiers
// Description: Canonical opaque identifiers for zones, events, flows, and runs.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the string-based identifiers used throughout
//! Flowgate. Identifiers are opaque and serialize as strings. Validation is
//! handled at the boundary that constructs them (the gateway, flow upsert)
//! rather than within these simple wrappers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Macro
// ============================================================================

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new ", stringify!($name), ".")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true when the identifier is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_id!(ZoneId, "Tenant-scoped zone identifier — the primary isolation boundary.");
string_id!(OrgId, "Organization identifier.");
string_id!(UserId, "Authenticated user identifier.");
string_id!(EventId, "Unique identifier minted for an ingested event envelope.");
string_id!(FlowId, "Flow (automation DAG) identifier.");
string_id!(NodeId, "Node identifier within a flow graph.");
string_id!(EdgeId, "Edge identifier within a flow graph.");
string_id!(ExecutionId, "Unique identifier for a single flow execution.");
string_id!(IdempotencyKey, "Caller-supplied idempotency key for ingest deduplication.");
string_id!(TopicName, "Stream bus topic name, derived as zone.<zone>.event.<type>.");

/// Deployment mode partitioning test traffic from live traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Test-mode traffic; never touches live ledgers.
    Test,
    /// Live production traffic.
    Live,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Live => write!(f, "live"),
        }
    }
}
