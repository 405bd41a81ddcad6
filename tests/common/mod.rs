// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use go_zoom_dynamo_streams::{
    ChangeRecord, ConsumerConfig, HeartbeatAction, IteratorPosition, RecordBatch, RecordHandler,
    ShardDescriptor, StreamsClientError, StreamsClientTrait,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("go_zoom_dynamo_streams=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn create_test_config() -> ConsumerConfig {
    ConsumerConfig {
        stream_arn: "arn:aws:dynamodb:us-east-1:000000000000:table/orders/stream/1".to_string(),
        busy_poll_delay: Duration::from_millis(1),
        idle_poll_delay: Duration::from_millis(2),
        shard_settle_delay: Duration::from_millis(2),
        heartbeat_timeout: Duration::from_secs(10),
        heartbeat_check_interval: Duration::from_millis(50),
        heartbeat_action: HeartbeatAction::Notify,
        ..Default::default()
    }
}

/// In-process stream: each shard is a fixed list of sequence numbers, served one record
/// per batch, closed once read through. Iterators are `<shard>@<index>`.
#[derive(Clone, Default)]
pub struct FixtureStream {
    shards: Arc<Mutex<Vec<(ShardDescriptor, Vec<String>)>>>,
    iterator_requests: Arc<Mutex<Vec<(String, IteratorPosition)>>>,
}

impl FixtureStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shard(&self, shard: ShardDescriptor, sequences: &[&str]) {
        self.shards
            .lock()
            .push((shard, sequences.iter().map(|s| s.to_string()).collect()));
    }

    pub fn iterator_requests(&self) -> Vec<(String, IteratorPosition)> {
        self.iterator_requests.lock().clone()
    }

    fn sequences(&self, shard_id: &str) -> Result<Vec<String>, StreamsClientError> {
        self.shards
            .lock()
            .iter()
            .find(|(s, _)| s.shard_id() == shard_id)
            .map(|(_, seqs)| seqs.clone())
            .ok_or_else(|| StreamsClientError::ResourceNotFound(shard_id.to_string()))
    }
}

#[async_trait]
impl StreamsClientTrait for FixtureStream {
    async fn list_shards(&self, _stream_arn: &str) -> Result<Vec<ShardDescriptor>, StreamsClientError> {
        Ok(self.shards.lock().iter().map(|(s, _)| s.clone()).collect())
    }

    async fn get_shard_iterator(
        &self,
        _stream_arn: &str,
        shard_id: &str,
        position: &IteratorPosition,
    ) -> Result<String, StreamsClientError> {
        self.iterator_requests
            .lock()
            .push((shard_id.to_string(), position.clone()));

        let sequences = self.sequences(shard_id)?;
        let start = match position {
            IteratorPosition::TrimHorizon => 0,
            IteratorPosition::AfterSequenceNumber(seq) => sequences
                .iter()
                .position(|s| s == seq)
                .map(|i| i + 1)
                .ok_or(StreamsClientError::TrimmedDataAccess(seq.clone()))?,
        };
        Ok(format!("{shard_id}@{start}"))
    }

    async fn get_records(
        &self,
        iterator: &str,
        _limit: Option<i32>,
    ) -> Result<RecordBatch, StreamsClientError> {
        let (shard_id, index) = iterator
            .rsplit_once('@')
            .ok_or_else(|| StreamsClientError::Other(format!("bad iterator {iterator}")))?;
        let index: usize = index
            .parse()
            .map_err(|_| StreamsClientError::Other(format!("bad iterator {iterator}")))?;

        let sequences = self.sequences(shard_id)?;
        match sequences.get(index) {
            Some(seq) => Ok(RecordBatch::new(
                vec![ChangeRecord::new(seq.as_str()).with_event_name("INSERT")],
                Some(format!("{shard_id}@{}", index + 1)),
            )),
            None => Ok(RecordBatch::new(vec![], None)),
        }
    }
}

/// Collects delivered records as `(shard, sequence)`
#[derive(Clone, Default)]
pub struct CollectingHandler {
    seen: Arc<Mutex<Vec<(String, String)>>>,
    fail_on: Arc<Mutex<HashMap<String, String>>>,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().clone()
    }

    pub fn sequences(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(_, seq)| seq.clone()).collect()
    }

    pub fn fail_on(&self, shard_id: &str, sequence_number: &str) {
        self.fail_on
            .lock()
            .insert(shard_id.to_string(), sequence_number.to_string());
    }
}

#[async_trait]
impl RecordHandler for CollectingHandler {
    async fn handle_record(
        &self,
        _stream_arn: &str,
        shard: &ShardDescriptor,
        record: &ChangeRecord,
    ) -> anyhow::Result<()> {
        let failing = self.fail_on.lock().get(shard.shard_id()).cloned();
        if failing.as_deref() == Some(record.sequence_number()) {
            anyhow::bail!("poison record {}", record.sequence_number());
        }
        self.seen
            .lock()
            .push((shard.shard_id().to_string(), record.sequence_number().to_string()));
        Ok(())
    }
}
