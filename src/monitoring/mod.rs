//! Monitoring for shard lifecycle and polling activity
//!
//! When enabled, the consumer streams [`ConsumerEvent`]s over a bounded channel. A
//! [`MetricsAggregator`] can fold them into per-shard counters.

mod metrics;
mod types;

pub use metrics::{MetricsAggregator, ShardMetrics};
pub use types::{ConsumerEvent, ConsumerEventType, MonitoringConfig, SkipReason};
