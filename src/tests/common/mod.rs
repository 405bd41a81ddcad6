use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::monitoring::{ConsumerEvent, MonitoringConfig};
use crate::test::mocks::{Call, CallLog, MockRecordHandler, MockStatusHandler, MockStreamsClient};
use crate::test::TestUtils;
use crate::{ConsumerConfig, ProgressSnapshot, StreamConsumer};

/// Upper bound for any single consumer run in these tests
pub const RUN_TIMEOUT: Duration = Duration::from_secs(5);

/// Mock client and handlers sharing one call log
pub struct TestContext {
    pub config: ConsumerConfig,
    pub log: CallLog,
    pub client: MockStreamsClient,
    pub records: MockRecordHandler,
    pub statuses: MockStatusHandler,
}

impl TestContext {
    pub fn new() -> Self {
        crate::test::init_logging();
        let log = CallLog::new();
        Self {
            config: TestUtils::create_test_config(),
            client: MockStreamsClient::with_log(log.clone()),
            records: MockRecordHandler::new(log.clone()),
            statuses: MockStatusHandler::new(log.clone()),
            log,
        }
    }

    pub fn consumer(&self, prior: Option<ProgressSnapshot>) -> StreamConsumer<MockStreamsClient> {
        let (mut consumer, _) = StreamConsumer::new(self.config.clone(), self.client.clone(), prior);
        consumer.set_record_handler(self.records.clone());
        consumer.set_status_handler(self.statuses.clone());
        consumer
    }

    /// Consumer with monitoring enabled, plus its event receiver
    pub fn monitored_consumer(
        &mut self,
        prior: Option<ProgressSnapshot>,
    ) -> (StreamConsumer<MockStreamsClient>, mpsc::Receiver<ConsumerEvent>) {
        self.config.monitoring = MonitoringConfig {
            enabled: true,
            channel_size: 1000,
            metrics_interval: Duration::from_millis(50),
        };
        let (mut consumer, rx) = StreamConsumer::new(self.config.clone(), self.client.clone(), prior);
        consumer.set_record_handler(self.records.clone());
        consumer.set_status_handler(self.statuses.clone());
        (consumer, rx.expect("monitoring enabled"))
    }

    pub fn index_of(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.log
            .position(predicate)
            .unwrap_or_else(|| panic!("expected call missing from log: {:#?}", self.log.calls()))
    }
}

pub async fn run_bounded(
    consumer: &StreamConsumer<MockStreamsClient>,
    deadline: Option<DateTime<Utc>>,
) -> crate::Result<()> {
    tokio::time::timeout(RUN_TIMEOUT, consumer.run(deadline))
        .await
        .expect("consumer run did not finish in time")
}

pub fn deadline_in(millis: i64) -> Option<DateTime<Utc>> {
    Some(Utc::now() + chrono::Duration::milliseconds(millis))
}

pub fn snapshot(entries: &[(&str, &str)]) -> ProgressSnapshot {
    ProgressSnapshot::from_strings(entries.iter().copied()).expect("valid snapshot")
}

pub fn is_status(shard: &str, status: &str) -> impl Fn(&Call) -> bool {
    let shard = shard.to_string();
    let status = status.to_string();
    move |call| matches!(call, Call::Status { shard_id, status: s } if *shard_id == shard && s.to_string() == status)
}

pub fn is_get_iterator(shard: &str) -> impl Fn(&Call) -> bool {
    let shard = shard.to_string();
    move |call| matches!(call, Call::GetIterator { shard_id, .. } if *shard_id == shard)
}

pub fn is_record(shard: &str) -> impl Fn(&Call) -> bool {
    let shard = shard.to_string();
    move |call| matches!(call, Call::Record { shard_id, .. } if *shard_id == shard)
}
