use std::time::{Duration, SystemTime};

/// Configuration for the monitoring system
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
    /// How often the metrics aggregator logs its counters
    pub metrics_interval: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
            metrics_interval: Duration::from_secs(60),
        }
    }
}

/// Represents a monitoring event from the consumer
#[derive(Debug, Clone)]
pub struct ConsumerEvent {
    /// When the event occurred
    pub timestamp: SystemTime,
    /// ID of the shard this event relates to, empty for stream-wide events
    pub shard_id: String,
    /// The type of event and its details
    pub event_type: ConsumerEventType,
}

/// Why a listed shard was not polled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Shard already closed
    Closed,
    /// Parent still open
    ActiveParent,
    /// Parent does not match the walk's filter
    Filtered,
    /// Already handed to a poller earlier in this run
    AlreadyPolled,
}

#[derive(Debug, Clone)]
pub enum ConsumerEventType {
    /// A walk listed the stream
    ShardsListed {
        parent_filter: Option<String>,
        shard_count: usize,
    },
    ShardSkipped {
        reason: SkipReason,
    },
    /// First poll of a shard; "new" status handled
    ShardActivated,
    ShardResumed {
        sequence_number: String,
    },
    BatchFetched {
        record_count: usize,
        duration: Duration,
    },
    RecordCheckpointed {
        sequence_number: String,
    },
    ShardClosed,
    /// The run deadline stopped a shard that still had an iterator
    DeadlineReached,
    ShardFailed {
        error: String,
    },
    HeartbeatExpired {
        idle: Duration,
    },
}

impl ConsumerEvent {
    fn now(shard_id: impl Into<String>, event_type: ConsumerEventType) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shard_id: shard_id.into(),
            event_type,
        }
    }

    pub fn shards_listed(parent_filter: Option<&str>, shard_count: usize) -> Self {
        Self::now(
            "",
            ConsumerEventType::ShardsListed {
                parent_filter: parent_filter.map(String::from),
                shard_count,
            },
        )
    }

    pub fn shard_skipped(shard_id: &str, reason: SkipReason) -> Self {
        Self::now(shard_id, ConsumerEventType::ShardSkipped { reason })
    }

    pub fn shard_activated(shard_id: &str) -> Self {
        Self::now(shard_id, ConsumerEventType::ShardActivated)
    }

    pub fn shard_resumed(shard_id: &str, sequence_number: &str) -> Self {
        Self::now(
            shard_id,
            ConsumerEventType::ShardResumed {
                sequence_number: sequence_number.to_string(),
            },
        )
    }

    pub fn batch_fetched(shard_id: &str, record_count: usize, duration: Duration) -> Self {
        Self::now(
            shard_id,
            ConsumerEventType::BatchFetched {
                record_count,
                duration,
            },
        )
    }

    pub fn record_checkpointed(shard_id: &str, sequence_number: &str) -> Self {
        Self::now(
            shard_id,
            ConsumerEventType::RecordCheckpointed {
                sequence_number: sequence_number.to_string(),
            },
        )
    }

    pub fn shard_closed(shard_id: &str) -> Self {
        Self::now(shard_id, ConsumerEventType::ShardClosed)
    }

    pub fn deadline_reached(shard_id: &str) -> Self {
        Self::now(shard_id, ConsumerEventType::DeadlineReached)
    }

    pub fn shard_failed(shard_id: &str, error: String) -> Self {
        Self::now(shard_id, ConsumerEventType::ShardFailed { error })
    }

    pub fn heartbeat_expired(idle: Duration) -> Self {
        Self::now("", ConsumerEventType::HeartbeatExpired { idle })
    }
}
