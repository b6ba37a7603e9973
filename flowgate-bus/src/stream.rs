// flowgate-bus/src/stream.rs
// ============================================================================
// Module: In-Memory Stream Bus
// Description: Append-only per-topic log with consumer-group delivery.
// Purpose: Reference implementation of flowgate_core::interfaces::StreamBus
//          (spec §4.1) suitable for single-process deployments and tests;
//          REDIS_ADDR names the production swap-in (flowgate-config), not
//          implemented here.
// Dependencies: flowgate-core, async-trait, tokio
// ============================================================================

//! ## Overview
//! Ordering is strict per-topic FIFO. A consumer group tracks an offset into
//! the topic's append log plus a pending set of in-flight entries; an entry
//! becomes redeliverable once its visibility window elapses without an ack,
//! exactly as a crashed consumer's work reappears in the reference design.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use flowgate_core::event::StreamEntry;
use flowgate_core::interfaces::BusEntry;
use flowgate_core::interfaces::BusError;
use flowgate_core::interfaces::StreamBus;

use crate::pattern::glob_match;

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingEntry {
    entry: StreamEntry,
    visible_after: Instant,
}

#[derive(Default)]
struct ConsumerGroup {
    next_offset: usize,
    pending: BTreeMap<u64, PendingEntry>,
}

#[derive(Default)]
struct Topic {
    entries: VecDeque<(u64, StreamEntry)>,
    next_entry_id: u64,
    groups: BTreeMap<String, ConsumerGroup>,
}

/// In-memory, single-process [`StreamBus`] implementation.
#[derive(Default)]
pub struct InMemoryStreamBus {
    topics: Mutex<BTreeMap<String, Topic>>,
}

impl InMemoryStreamBus {
    /// Builds an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamBus for InMemoryStreamBus {
    async fn append(&self, topic: &str, entry: StreamEntry) -> Result<String, BusError> {
        let mut topics = self.topics.lock().map_err(|_| BusError::Unreachable("bus lock poisoned".to_string()))?;
        let state = topics.entry(topic.to_string()).or_default();
        let entry_id = state.next_entry_id;
        state.next_entry_id += 1;
        state.entries.push_back((entry_id, entry));
        Ok(entry_id.to_string())
    }

    async fn read(
        &self,
        topic: &str,
        group: &str,
        _consumer: &str,
        max: usize,
        block: Duration,
    ) -> Result<Vec<BusEntry>, BusError> {
        let batch = self.try_read(topic, group, max)?;
        if !batch.is_empty() || block.is_zero() {
            return Ok(batch);
        }
        tokio::time::sleep(block).await;
        self.try_read(topic, group, max)
    }

    async fn ack(&self, topic: &str, group: &str, entry_id: &str) -> Result<(), BusError> {
        let id: u64 = entry_id
            .parse()
            .map_err(|_| BusError::Rejected(format!("invalid entry id: {entry_id}")))?;
        let mut topics = self.topics.lock().map_err(|_| BusError::Unreachable("bus lock poisoned".to_string()))?;
        let Some(state) = topics.get_mut(topic) else {
            return Err(BusError::Rejected(format!("unknown topic: {topic}")));
        };
        let Some(group_state) = state.groups.get_mut(group) else {
            return Err(BusError::Rejected(format!("unknown group: {group}")));
        };
        group_state.pending.remove(&id);
        Ok(())
    }

    async fn ensure_group(&self, topic: &str, group: &str) -> Result<(), BusError> {
        let mut topics = self.topics.lock().map_err(|_| BusError::Unreachable("bus lock poisoned".to_string()))?;
        let state = topics.entry(topic.to_string()).or_default();
        state.groups.entry(group.to_string()).or_insert_with(|| ConsumerGroup {
            next_offset: state.entries.len(),
            pending: BTreeMap::new(),
        });
        Ok(())
    }

    async fn discover(&self, pattern: &str) -> Result<Vec<String>, BusError> {
        let topics = self.topics.lock().map_err(|_| BusError::Unreachable("bus lock poisoned".to_string()))?;
        Ok(topics.keys().filter(|name| glob_match(pattern, name)).cloned().collect())
    }
}

impl InMemoryStreamBus {
    fn try_read(&self, topic: &str, group: &str, max: usize) -> Result<Vec<BusEntry>, BusError> {
        let mut topics = self.topics.lock().map_err(|_| BusError::Unreachable("bus lock poisoned".to_string()))?;
        let state = topics.entry(topic.to_string()).or_default();
        let entries_snapshot: Vec<(u64, StreamEntry)> = state.entries.iter().cloned().collect();
        let group_state = state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| ConsumerGroup { next_offset: entries_snapshot.len(), pending: BTreeMap::new() });

        let now = Instant::now();
        let mut out = Vec::new();

        let redeliverable: Vec<u64> = group_state
            .pending
            .iter()
            .filter(|(_, pending)| pending.visible_after <= now)
            .map(|(id, _)| *id)
            .take(max)
            .collect();
        for id in redeliverable {
            if let Some(pending) = group_state.pending.get_mut(&id) {
                pending.visible_after = now + DEFAULT_VISIBILITY_TIMEOUT;
                out.push(BusEntry { entry_id: id.to_string(), entry: pending.entry.clone() });
            }
        }

        while out.len() < max && group_state.next_offset < entries_snapshot.len() {
            let (id, entry) = entries_snapshot[group_state.next_offset].clone();
            group_state.next_offset += 1;
            group_state.pending.insert(id, PendingEntry { entry: entry.clone(), visible_after: now + DEFAULT_VISIBILITY_TIMEOUT });
            out.push(BusEntry { entry_id: id.to_string(), entry });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use super::*;
    use flowgate_core::event::EventEnvelope;
    use flowgate_core::ids::EventId;
    use flowgate_core::ids::IdempotencyKey;
    use flowgate_core::ids::Mode;
    use flowgate_core::ids::OrgId;
    use flowgate_core::ids::ZoneId;
    use flowgate_core::time::Timestamp;
    use serde_json::Value;
    use std::collections::BTreeMap as StdBTreeMap;

    fn sample_entry() -> StreamEntry {
        let envelope = EventEnvelope {
            id: EventId::new("evt_1"),
            event_type: "order.created".to_string(),
            zone_id: ZoneId::new("z1"),
            org_id: OrgId::new("o1"),
            mode: Mode::Test,
            timestamp: Timestamp::now(),
            idempotency_key: IdempotencyKey::new("k1"),
            payload: Value::Null,
            meta: StdBTreeMap::new(),
        };
        StreamEntry::new(envelope, 0)
    }

    #[tokio::test]
    async fn append_then_read_delivers_once() {
        let bus = InMemoryStreamBus::new();
        bus.append("t1", sample_entry()).await.unwrap();
        bus.ensure_group("t1", "g1").await.unwrap();
        let batch = bus.read("t1", "g1", "c1", 10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        let second = bus.read("t1", "g1", "c1", 10, Duration::ZERO).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn ack_removes_from_pending() {
        let bus = InMemoryStreamBus::new();
        bus.append("t1", sample_entry()).await.unwrap();
        bus.ensure_group("t1", "g1").await.unwrap();
        let batch = bus.read("t1", "g1", "c1", 10, Duration::ZERO).await.unwrap();
        bus.ack("t1", "g1", &batch[0].entry_id).await.unwrap();
    }

    #[tokio::test]
    async fn discover_matches_zone_event_pattern() {
        let bus = InMemoryStreamBus::new();
        bus.append("zone.z1.event.order.created", sample_entry()).await.unwrap();
        let found = bus.discover("zone.*.event.*").await.unwrap();
        assert_eq!(found, vec!["zone.z1.event.order.created".to_string()]);
    }
}
