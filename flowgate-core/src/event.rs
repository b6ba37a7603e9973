// flowgate-core/src/event.rs
// ============================================================================
// Module: Flowgate Event Envelope
// Description: Canonical wire form of an ingested business event.
// Purpose: Define EventEnvelope and topic derivation shared by the gateway,
//          stream bus, and flow runtime.
// Dependencies: crate::ids, crate::time, serde
// ============================================================================

//! ## Overview
//! `EventEnvelope` is immutable once ingested. Two envelopes sharing a
//! `(zone_id, idempotency_key)` within the dedup TTL MUST resolve to the same
//! `id` and `topic` — that invariant is enforced by the gateway (spec §4.3),
//! not by this type; this module only defines the shape and the topic-name
//! derivation rule both the gateway and the runtime worker rely on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::EventId;
use crate::ids::IdempotencyKey;
use crate::ids::Mode;
use crate::ids::OrgId;
use crate::ids::TopicName;
use crate::ids::ZoneId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Event Envelope
// ============================================================================

/// Canonical, immutable wire form of an ingested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identifier (`evt_<nanos>` or a caller-independent id).
    pub id: EventId,
    /// Dotted event type, e.g. `payment.succeeded`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Zone (tenant) identifier.
    pub zone_id: ZoneId,
    /// Organization identifier.
    pub org_id: OrgId,
    /// Test/live partition the ingesting key was resolved under; carried
    /// through to the execution it triggers so ledger writes land in the
    /// matching partition (spec.md:278 "test traffic never touches live
    /// ledgers").
    pub mode: Mode,
    /// UTC ingestion timestamp.
    pub timestamp: Timestamp,
    /// Idempotency key used for ingest deduplication.
    pub idempotency_key: IdempotencyKey,
    /// Arbitrary JSON payload supplied by the caller.
    pub payload: Value,
    /// String metadata map (`source`, `env`, `payload_hash`, ...).
    pub meta: BTreeMap<String, String>,
}

impl EventEnvelope {
    /// Derives the stream bus topic name for this envelope:
    /// `zone.<zone_id>.event.<type>`.
    #[must_use]
    pub fn topic(&self) -> TopicName {
        topic_for(&self.zone_id, &self.event_type)
    }
}

/// Derives the stream bus topic name for a `(zone, event_type)` pair.
#[must_use]
pub fn topic_for(zone_id: &ZoneId, event_type: &str) -> TopicName {
    TopicName::new(format!("zone.{zone_id}.event.{event_type}"))
}

/// A stream entry as persisted on the bus: the envelope plus the publish
/// timestamp. Readers MUST prefer `envelope`; `data` duplicates it for
/// back-compat with consumers written against an older wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    /// The canonical event envelope.
    pub envelope: EventEnvelope,
    /// Publish timestamp, epoch seconds.
    pub ts: i64,
    /// Back-compat duplicate of `envelope`. Readers must prefer `envelope`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<EventEnvelope>,
}

impl StreamEntry {
    /// Builds a stream entry from an envelope, populating both `envelope`
    /// and the back-compat `data` field.
    #[must_use]
    pub fn new(envelope: EventEnvelope, ts: i64) -> Self {
        Self { data: Some(envelope.clone()), envelope, ts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_derivation_matches_spec_format() {
        let zone = ZoneId::new("z1");
        let topic = topic_for(&zone, "order.created");
        assert_eq!(topic.as_str(), "zone.z1.event.order.created");
    }
}
