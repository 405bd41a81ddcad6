//! Test utilities and mock implementations for testing the stream consumer


use std::time::Duration;

use crate::consumer::ConsumerConfig;
use crate::heartbeat::HeartbeatAction;
use crate::types::ChangeRecord;

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    pub fn create_test_records(sequences: &[&str]) -> Vec<ChangeRecord> {
        sequences.iter().map(|s| ChangeRecord::new(*s)).collect()
    }

    /// Fast-paced configuration that never exits the test process on heartbeat expiry
    pub fn create_test_config() -> ConsumerConfig {
        ConsumerConfig {
            stream_arn: "arn:aws:dynamodb:us-east-1:000000000000:table/test/stream/1".to_string(),
            busy_poll_delay: Duration::from_millis(1),
            idle_poll_delay: Duration::from_millis(5),
            shard_settle_delay: Duration::from_millis(5),
            heartbeat_timeout: Duration::from_secs(10),
            heartbeat_check_interval: Duration::from_millis(10),
            heartbeat_action: HeartbeatAction::Notify,
            ..Default::default()
        }
    }
}

#[cfg(test)]
static INIT: std::sync::Once = std::sync::Once::new();

/// Initialize logging for tests
#[cfg(test)]
pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("go_zoom_dynamo_streams=debug".parse().unwrap()),
            )
            .with_test_writer()
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .ok();
    });
}
