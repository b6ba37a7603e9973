// flowgate-bus/src/dedup.rs
// ============================================================================
// Module: In-Memory Dedup Store
// Description: Atomic get-or-set keyed cache with TTL expiry.
// Purpose: Reference implementation of flowgate_core::interfaces::DedupStore
//          (spec §4.2) suitable for single-process deployments and tests.
// Dependencies: flowgate-core, async-trait
// ============================================================================

//! ## Overview
//! A single process-wide mutex guards the map; `set_if_absent` is atomic
//! because the check-then-insert happens while the lock is held. Expired
//! entries are evicted lazily, on the next `get` or `set_if_absent` that
//! touches the same key.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use flowgate_core::interfaces::DedupError;
use flowgate_core::interfaces::DedupStore;

struct Slot {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory, single-process [`DedupStore`] implementation.
#[derive(Default)]
pub struct InMemoryDedupStore {
    entries: Mutex<BTreeMap<String, Slot>>,
}

impl InMemoryDedupStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DedupError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DedupError::Unreachable("dedup lock poisoned".to_string()))?;
        let now = Instant::now();
        if let Some(slot) = entries.get(key) {
            if slot.expires_at <= now {
                entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(slot.value.clone()));
        }
        Ok(None)
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<Vec<u8>, DedupError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DedupError::Unreachable("dedup lock poisoned".to_string()))?;
        let now = Instant::now();
        if let Some(slot) = entries.get(key) {
            if slot.expires_at > now {
                return Ok(slot.value.clone());
            }
        }
        entries.insert(key.to_string(), Slot { value: value.clone(), expires_at: now + ttl });
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    #![allow(clippy::expect_used, reason = "test-only assertions")]
    use super::*;

    #[tokio::test]
    async fn set_if_absent_wins_first_writer() {
        let store = InMemoryDedupStore::new();
        let first = store.set_if_absent("k1", b"a".to_vec(), Duration::from_secs(60)).await.unwrap();
        let second = store.set_if_absent("k1", b"b".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(first, b"a".to_vec());
        assert_eq!(second, b"a".to_vec());
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_key() {
        let store = InMemoryDedupStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entry_is_reclaimable() {
        let store = InMemoryDedupStore::new();
        store.set_if_absent("k1", b"a".to_vec(), Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let winner = store.set_if_absent("k1", b"b".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(winner, b"b".to_vec());
    }

    proptest::proptest! {
        #[test]
        fn set_if_absent_always_returns_the_first_writer(
            key in "[a-z]{1,12}",
            first in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..16),
            second in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..16),
        ) {
            let runtime = tokio::runtime::Runtime::new().expect("build runtime");
            let (winner_first, winner_second) = runtime.block_on(async {
                let store = InMemoryDedupStore::new();
                let a = store.set_if_absent(&key, first.clone(), Duration::from_secs(60)).await.unwrap();
                let b = store.set_if_absent(&key, second.clone(), Duration::from_secs(60)).await.unwrap();
                (a, b)
            });
            proptest::prop_assert_eq!(&winner_first, &first);
            proptest::prop_assert_eq!(&winner_second, &first);
        }
    }
}
