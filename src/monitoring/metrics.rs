use super::types::{ConsumerEvent, ConsumerEventType, SkipReason};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Holds aggregated metrics for a single shard
#[derive(Debug, Clone)]
pub struct ShardMetrics {
    pub batches_fetched: u64,
    pub empty_batches: u64,
    pub records_checkpointed: u64,
    pub fetch_time: Duration,
    pub max_fetch_time: Duration,
    pub skipped_active_parent: u64,
    pub activated: bool,
    pub closed: bool,
    pub deadline_reached: bool,
    pub last_sequence_number: Option<String>,
    pub errors: u64,
    pub last_updated: Instant,
}

impl Default for ShardMetrics {
    fn default() -> Self {
        Self {
            batches_fetched: 0,
            empty_batches: 0,
            records_checkpointed: 0,
            fetch_time: Duration::default(),
            max_fetch_time: Duration::default(),
            skipped_active_parent: 0,
            activated: false,
            closed: false,
            deadline_reached: false,
            last_sequence_number: None,
            errors: 0,
            last_updated: Instant::now(),
        }
    }
}

/// Aggregates monitoring events into metrics
pub struct MetricsAggregator {
    metrics: Arc<RwLock<HashMap<String, ShardMetrics>>>,
    window_duration: Duration,
    monitoring_rx: tokio::sync::mpsc::Receiver<ConsumerEvent>,
}

impl MetricsAggregator {
    pub fn new(
        window_duration: Duration,
        monitoring_rx: tokio::sync::mpsc::Receiver<ConsumerEvent>,
    ) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(HashMap::new())),
            window_duration,
            monitoring_rx,
        }
    }

    /// Handle to the live metrics, usable after [`run`](Self::run) takes ownership
    pub fn metrics_handle(&self) -> Arc<RwLock<HashMap<String, ShardMetrics>>> {
        self.metrics.clone()
    }

    /// Process events until the consumer drops its sender, logging on every window
    pub async fn run(mut self) {
        let mut ticker = interval(self.window_duration);

        loop {
            tokio::select! {
                event = self.monitoring_rx.recv() => match event {
                    Some(event) => self.process_event(event).await,
                    None => break,
                },
                _ = ticker.tick() => self.emit_metrics().await,
            }
        }

        self.emit_metrics().await;
        debug!("Monitoring channel closed, metrics aggregator stopped");
    }

    pub async fn process_event(&self, event: ConsumerEvent) {
        if let ConsumerEventType::HeartbeatExpired { idle } = event.event_type {
            warn!(idle_ms = idle.as_millis() as u64, "Heartbeat expired");
            return;
        }
        if let ConsumerEventType::ShardsListed {
            parent_filter,
            shard_count,
        } = &event.event_type
        {
            debug!(parent = ?parent_filter, shards = shard_count, "Shards listed");
            return;
        }

        let mut metrics = self.metrics.write().await;
        let shard = metrics.entry(event.shard_id.clone()).or_default();

        match event.event_type {
            ConsumerEventType::ShardSkipped { reason } => {
                if reason == SkipReason::ActiveParent {
                    shard.skipped_active_parent += 1;
                }
            }
            ConsumerEventType::ShardActivated => shard.activated = true,
            ConsumerEventType::ShardResumed { sequence_number } => {
                shard.last_sequence_number = Some(sequence_number);
            }
            ConsumerEventType::BatchFetched {
                record_count,
                duration,
            } => {
                shard.batches_fetched += 1;
                if record_count == 0 {
                    shard.empty_batches += 1;
                }
                shard.fetch_time += duration;
                shard.max_fetch_time = shard.max_fetch_time.max(duration);
            }
            ConsumerEventType::RecordCheckpointed { sequence_number } => {
                shard.records_checkpointed += 1;
                shard.last_sequence_number = Some(sequence_number);
            }
            ConsumerEventType::ShardClosed => shard.closed = true,
            ConsumerEventType::DeadlineReached => shard.deadline_reached = true,
            ConsumerEventType::ShardFailed { error } => {
                shard.errors += 1;
                warn!(shard_id = %event.shard_id, error = %error, "Shard failed");
            }
            ConsumerEventType::ShardsListed { .. } | ConsumerEventType::HeartbeatExpired { .. } => {}
        }

        shard.last_updated = Instant::now();
    }

    async fn emit_metrics(&self) {
        let metrics = self.metrics.read().await;

        for (shard_id, m) in metrics.iter() {
            if m.last_updated.elapsed() > self.window_duration * 2 {
                continue;
            }

            info!(
                shard_id = %shard_id,
                batches = m.batches_fetched,
                empty_batches = m.empty_batches,
                records = m.records_checkpointed,
                max_fetch_ms = m.max_fetch_time.as_millis() as u64,
                last_sequence = ?m.last_sequence_number,
                closed = m.closed,
                "Metrics for window"
            );

            if m.errors > 0 {
                warn!(shard_id = %shard_id, errors = m.errors, "Shard errors detected");
            }
        }
    }

    /// Get current metrics for all shards
    pub async fn get_metrics(&self) -> HashMap<String, ShardMetrics> {
        self.metrics.read().await.clone()
    }

    /// Get metrics for a specific shard
    pub async fn get_shard_metrics(&self, shard_id: &str) -> Option<ShardMetrics> {
        self.metrics.read().await.get(shard_id).cloned()
    }
}
