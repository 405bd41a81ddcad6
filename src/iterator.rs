use std::sync::Arc;
use tracing::{error, trace};

use crate::client::{StreamsClientError, StreamsClientTrait};
use crate::error::{ConsumerError, Result};
use crate::heartbeat::Heartbeat;
use crate::types::{IteratorPosition, RecordBatch, ShardDescriptor};

/// Stream client wrapper used by walkers and pollers
///
/// Every successful call beats the heartbeat. Failures are never retried here; a missing
/// response field surfaces as [`ConsumerError::MalformedResponse`], anything else keeps the
/// client's classification.
pub struct ShardIteratorClient<C: StreamsClientTrait> {
    client: Arc<C>,
    heartbeat: Arc<Heartbeat>,
    stream_arn: String,
    batch_limit: Option<i32>,
}

impl<C: StreamsClientTrait> ShardIteratorClient<C> {
    pub fn new(
        client: Arc<C>,
        heartbeat: Arc<Heartbeat>,
        stream_arn: impl Into<String>,
        batch_limit: Option<i32>,
    ) -> Self {
        Self {
            client,
            heartbeat,
            stream_arn: stream_arn.into(),
            batch_limit,
        }
    }

    pub fn stream_arn(&self) -> &str {
        &self.stream_arn
    }

    pub async fn list_shards(&self) -> Result<Vec<ShardDescriptor>> {
        match self.client.list_shards(&self.stream_arn).await {
            Ok(shards) => {
                self.heartbeat.beat();
                trace!(stream = %self.stream_arn, shards = shards.len(), "Listed shards");
                Ok(shards)
            }
            Err(StreamsClientError::MissingField(field)) => {
                Err(ConsumerError::MalformedResponse(field))
            }
            Err(e) => {
                error!(stream = %self.stream_arn, error = %e, "Failed to list shards");
                Err(ConsumerError::ListShardsFailed(e))
            }
        }
    }

    pub async fn get_iterator(&self, shard_id: &str, position: &IteratorPosition) -> Result<String> {
        match self
            .client
            .get_shard_iterator(&self.stream_arn, shard_id, position)
            .await
        {
            Ok(iterator) => {
                self.heartbeat.beat();
                trace!(shard_id = %shard_id, ?position, "Acquired iterator");
                Ok(iterator)
            }
            Err(StreamsClientError::MissingField(field)) => {
                Err(ConsumerError::MalformedResponse(field))
            }
            Err(e) => {
                error!(shard_id = %shard_id, error = %e, "Failed to get iterator");
                Err(ConsumerError::GetIteratorFailed {
                    shard_id: shard_id.to_string(),
                    source: e,
                })
            }
        }
    }

    pub async fn get_records(&self, shard_id: &str, iterator: &str) -> Result<RecordBatch> {
        match self.client.get_records(iterator, self.batch_limit).await {
            Ok(batch) => {
                self.heartbeat.beat();
                trace!(
                    shard_id = %shard_id,
                    records = batch.records.len(),
                    exhausted = batch.is_exhausted(),
                    "Fetched records"
                );
                Ok(batch)
            }
            Err(StreamsClientError::MissingField(field)) => {
                Err(ConsumerError::MalformedResponse(field))
            }
            Err(e) => {
                error!(shard_id = %shard_id, error = %e, "Failed to get records");
                Err(ConsumerError::GetRecordsFailed {
                    shard_id: shard_id.to_string(),
                    source: e,
                })
            }
        }
    }
}
