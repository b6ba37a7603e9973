// flowgate-runtime/src/worker.rs
// ============================================================================
// Module: Stream-Consumer Worker
// Description: One consumer-group loop over a single topic (spec §4.4.1,
//              §5 "one stream-consumer task per (topic, consumer-name)
//              pair").
// Purpose: Read, dispatch, and ack; retry transient read failures with an
//          exponential pause; drain in-flight execution-start tasks on
//          shutdown.
// Dependencies: flowgate-core, tokio
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use flowgate_core::interfaces::ApprovalSigner;
use flowgate_core::interfaces::AuditSink;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::RunStore;
use flowgate_core::interfaces::StreamBus;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::audit::BusReadFailed;
use crate::config::WorkerConfig;
use crate::dispatch::Dispatcher;

/// Consumes one topic under one consumer group, dispatching matched flows
/// and acking each entry once its matches have been spawned.
pub struct Worker<St, L, Sig> {
    topic: String,
    bus: Arc<dyn StreamBus>,
    dispatcher: Arc<Dispatcher<St, L, Sig>>,
    config: WorkerConfig,
    audit: Arc<dyn AuditSink>,
}

impl<St, L, Sig> Worker<St, L, Sig>
where
    St: RunStore + 'static,
    L: LedgerClient + 'static,
    Sig: ApprovalSigner + 'static,
{
    /// Builds a worker over `topic`.
    #[must_use]
    pub fn new(topic: String, bus: Arc<dyn StreamBus>, dispatcher: Arc<Dispatcher<St, L, Sig>>, config: WorkerConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self { topic, bus, dispatcher, config, audit }
    }

    /// Runs the read-dispatch-ack loop until `shutdown` is signalled, then
    /// drains in-flight execution-start tasks for up to
    /// `config.shutdown_drain` before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if let Err(err) = self.bus.ensure_group(&self.topic, &self.config.consumer_group).await {
            self.audit.record(&BusReadFailed { topic: self.topic.clone(), reason: err.to_string(), retry_after_ms: 0 });
            return;
        }

        let mut tasks = JoinSet::new();
        let mut consecutive_failures: u32 = 0;

        while !*shutdown.borrow() {
            let read = self
                .bus
                .read(&self.topic, &self.config.consumer_group, &self.config.consumer_name, self.config.read_batch_size, self.config.read_block)
                .await;
            match read {
                Ok(entries) => {
                    consecutive_failures = 0;
                    for entry in &entries {
                        match self.dispatcher.dispatch(entry, &mut tasks, &shutdown).await {
                            Ok(()) => {
                                if let Err(err) = self.bus.ack(&self.topic, &self.config.consumer_group, &entry.entry_id).await {
                                    self.audit.record(&BusReadFailed { topic: self.topic.clone(), reason: err.to_string(), retry_after_ms: 0 });
                                }
                            }
                            Err(err) => {
                                // Leave unacked: the zone's flow lookup failed transiently,
                                // so the entry becomes eligible for redelivery instead of
                                // being silently dropped.
                                self.audit.record(&BusReadFailed { topic: self.topic.clone(), reason: err.to_string(), retry_after_ms: 0 });
                            }
                        }
                    }
                }
                Err(err) => {
                    let pause = backoff_pause(&self.config, consecutive_failures);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    self.audit.record(&BusReadFailed {
                        topic: self.topic.clone(),
                        reason: err.to_string(),
                        retry_after_ms: u64::try_from(pause.as_millis()).unwrap_or(u64::MAX),
                    });
                    wait_or_shutdown(pause, &mut shutdown).await;
                }
            }
        }

        drain(tasks, self.config.shutdown_drain).await;
    }
}

fn backoff_pause(config: &WorkerConfig, consecutive_failures: u32) -> Duration {
    let multiplier = 1u32.checked_shl(consecutive_failures).unwrap_or(u32::MAX);
    config.retry_base_pause.saturating_mul(multiplier).min(config.retry_max_pause)
}

async fn wait_or_shutdown(pause: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        () = tokio::time::sleep(pause) => {}
        _ = shutdown.changed() => {}
    }
}

async fn drain(mut tasks: JoinSet<()>, timeout: Duration) {
    let _ = tokio::time::timeout(timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    tasks.abort_all();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates_at_max() {
        let config = WorkerConfig::new("g", "c");
        assert_eq!(backoff_pause(&config, 0), Duration::from_secs(5));
        assert_eq!(backoff_pause(&config, 1), Duration::from_secs(10));
        assert_eq!(backoff_pause(&config, 2), Duration::from_secs(20));
        assert_eq!(backoff_pause(&config, 10), config.retry_max_pause);
    }
}
