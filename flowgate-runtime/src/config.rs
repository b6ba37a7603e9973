// flowgate-runtime/src/config.rs
// ============================================================================
// Module: Runtime Worker Configuration
// Description: Tunables for the stream-consumer worker pool (spec §4.4.1,
//              §5 backpressure).
// Purpose: Centralize the reference values the spec calls out by name so
//          callers override only what they need to.
// Dependencies: none
// ============================================================================

use std::time::Duration;

/// Tunables for one worker's topic-consumer loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Discovery pattern polled for newly created topics (`zone.*.event.*`).
    pub discover_pattern: String,
    /// Consumer group name shared across replicas of this worker.
    pub consumer_group: String,
    /// This replica's consumer name within the group.
    pub consumer_name: String,
    /// Max entries pulled per read (spec §5 "reference: 10").
    pub read_batch_size: usize,
    /// Read block duration, short enough to observe shutdown promptly (spec
    /// §5 "bounded block (reference: 1 s)").
    pub read_block: Duration,
    /// Base pause before retrying a failed bus read, doubled on each
    /// consecutive failure (spec §7 "exponential pause (reference: 5 s)").
    pub retry_base_pause: Duration,
    /// Ceiling on the exponential retry pause.
    pub retry_max_pause: Duration,
    /// How often the topic set is re-discovered to pick up newly created
    /// zones without a restart.
    pub rediscover_interval: Duration,
    /// Upper bound on concurrently in-flight execution-start tasks across
    /// all topics this worker serves.
    pub max_inflight_executions: usize,
    /// How long graceful shutdown waits for in-flight executions to finish
    /// starting before abandoning them (spec §5 "graceful shutdown drains
    /// for 15 s").
    pub shutdown_drain: Duration,
}

impl WorkerConfig {
    /// Builds a config with the spec's reference values and the given
    /// identity (group/consumer name are the only fields every deployment
    /// must set for itself).
    #[must_use]
    pub fn new(consumer_group: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        Self {
            discover_pattern: "zone.*.event.*".to_string(),
            consumer_group: consumer_group.into(),
            consumer_name: consumer_name.into(),
            read_batch_size: 10,
            read_block: Duration::from_secs(1),
            retry_base_pause: Duration::from_secs(5),
            retry_max_pause: Duration::from_secs(60),
            rediscover_interval: Duration::from_secs(10),
            max_inflight_executions: 64,
            shutdown_drain: Duration::from_secs(15),
        }
    }
}
