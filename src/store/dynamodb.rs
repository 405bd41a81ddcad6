//! Progress persisted in a DynamoDB table, one item per shard
//!
//! Items are keyed by `shard_id` (optionally prefixed, so several streams can share a table)
//! and carry the progress string in `progress`.

use async_trait::async_trait;
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoClient};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, trace};

use crate::error::CheckpointError;
use crate::retry::{ExponentialBackoff, RetryConfig, RetryHandle};
use crate::state::{ProgressSnapshot, ShardProgress};
use crate::store::CheckpointStore;

const KEY_ATTR: &str = "shard_id";
const PROGRESS_ATTR: &str = "progress";

#[derive(Debug, Clone)]
pub struct DynamoDbCheckpointStore {
    client: DynamoClient,
    table_name: String,
    key_prefix: String,
    retry_config: RetryConfig,
    backoff: ExponentialBackoff,
}

impl DynamoDbCheckpointStore {
    pub fn builder() -> DynamoDbCheckpointStoreBuilder {
        DynamoDbCheckpointStoreBuilder::new()
    }

    fn prefixed_key(&self, shard_id: &str) -> String {
        format!("{}{}", self.key_prefix, shard_id)
    }

    /// Decode one scanned item, skipping items that belong to another prefix
    fn decode_item(
        &self,
        item: &HashMap<String, AttributeValue>,
    ) -> Result<Option<(String, ShardProgress)>, CheckpointError> {
        let Some(key) = item.get(KEY_ATTR).and_then(|v| v.as_s().ok()) else {
            return Ok(None);
        };
        let Some(shard_id) = key.strip_prefix(self.key_prefix.as_str()) else {
            return Ok(None);
        };

        let raw = item
            .get(PROGRESS_ATTR)
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| {
                CheckpointError::InvalidData(format!("item {} has no {} string", key, PROGRESS_ATTR))
            })?;
        let progress = raw
            .parse()
            .map_err(|e| CheckpointError::InvalidData(format!("item {}: {}", key, e)))?;

        Ok(Some((shard_id.to_string(), progress)))
    }
}

#[async_trait]
impl CheckpointStore for DynamoDbCheckpointStore {
    #[instrument(skip(self), fields(table = %self.table_name, prefix = %self.key_prefix))]
    async fn load_snapshot(&self) -> Result<ProgressSnapshot, CheckpointError> {
        let mut snapshot = ProgressSnapshot::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut retry = RetryHandle::new(self.retry_config.clone(), self.backoff.clone());
            let page = retry
                .retry(|| {
                    let start_key = start_key.clone();
                    async move {
                        self.client
                            .scan()
                            .table_name(&self.table_name)
                            .set_exclusive_start_key(start_key)
                            .send()
                            .await
                    }
                })
                .await
                .map_err(|e| e.into_checkpoint_error(false))?;

            for item in page.items() {
                if let Some((shard_id, progress)) = self.decode_item(item)? {
                    snapshot.insert(shard_id, progress);
                }
            }

            trace!(shards = snapshot.len(), "Scanned checkpoint page");
            match page.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!(shards = snapshot.len(), "Loaded snapshot from DynamoDB");
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(table = %self.table_name, prefix = %self.key_prefix))]
    async fn save_progress(
        &self,
        shard_id: &str,
        progress: &ShardProgress,
    ) -> Result<(), CheckpointError> {
        let key = self.prefixed_key(shard_id);
        let value = progress.to_string();
        let mut retry = RetryHandle::new(self.retry_config.clone(), self.backoff.clone());

        retry
            .retry(|| async {
                self.client
                    .put_item()
                    .table_name(&self.table_name)
                    .item(KEY_ATTR, AttributeValue::S(key.clone()))
                    .item(PROGRESS_ATTR, AttributeValue::S(value.clone()))
                    .send()
                    .await
            })
            .await
            .map_err(|e| e.into_checkpoint_error(true))?;

        debug!(key = %key, progress = %value, "Saved progress to DynamoDB");
        Ok(())
    }
}

#[derive(Debug)]
pub struct DynamoDbCheckpointStoreBuilder {
    client: Option<DynamoClient>,
    table_name: Option<String>,
    key_prefix: Option<String>,
    retry_config: RetryConfig,
    backoff: ExponentialBackoff,
}

impl Default for DynamoDbCheckpointStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamoDbCheckpointStoreBuilder {
    pub fn new() -> Self {
        Self {
            client: None,
            table_name: None,
            key_prefix: None,
            retry_config: RetryConfig::default(),
            backoff: ExponentialBackoff::builder()
                .initial_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(5))
                .build(),
        }
    }

    pub fn with_client(mut self, client: DynamoClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(key_prefix.into());
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> anyhow::Result<DynamoDbCheckpointStore> {
        Ok(DynamoDbCheckpointStore {
            client: self
                .client
                .ok_or_else(|| anyhow::anyhow!("DynamoDB client is required"))?,
            table_name: self
                .table_name
                .ok_or_else(|| anyhow::anyhow!("Table name is required"))?,
            key_prefix: self.key_prefix.unwrap_or_default(),
            retry_config: self.retry_config,
            backoff: self.backoff,
        })
    }
}
