use async_trait::async_trait;
use aws_sdk_dynamodbstreams::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{Record, ShardIteratorType},
    Client,
};
use aws_smithy_types_convert::date_time::DateTimeExt;
use thiserror::Error;
use tracing::{trace, warn};

use crate::types::{ChangeRecord, IteratorPosition, RecordBatch, ShardDescriptor};

/// Failures of the three stream calls
#[derive(Debug, Error)]
pub enum StreamsClientError {
    #[error("Iterator expired")]
    ExpiredIterator,

    #[error("Requested records are beyond the trim horizon: {0}")]
    TrimmedDataAccess(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Request rate limit exceeded")]
    LimitExceeded,

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Missing field in response: {0}")]
    MissingField(&'static str),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("{0}")]
    Other(String),
}

/// The shard-based streaming API the consumer reads from
#[async_trait]
pub trait StreamsClientTrait: Send + Sync {
    /// All shards currently visible on the stream, across every listing page
    async fn list_shards(&self, stream_arn: &str) -> Result<Vec<ShardDescriptor>, StreamsClientError>;

    async fn get_shard_iterator(
        &self,
        stream_arn: &str,
        shard_id: &str,
        position: &IteratorPosition,
    ) -> Result<String, StreamsClientError>;

    async fn get_records(
        &self,
        iterator: &str,
        limit: Option<i32>,
    ) -> Result<RecordBatch, StreamsClientError>;
}

fn classify<E>(err: SdkError<E>) -> StreamsClientError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.code() {
        Some("ExpiredIteratorException") => StreamsClientError::ExpiredIterator,
        Some("TrimmedDataAccessException") => StreamsClientError::TrimmedDataAccess(message),
        Some("ResourceNotFoundException") => StreamsClientError::ResourceNotFound(message),
        Some("LimitExceededException") => StreamsClientError::LimitExceeded,
        Some("InternalServerError") => StreamsClientError::InternalServerError(message),
        _ => match err {
            SdkError::TimeoutError(_) => StreamsClientError::Timeout(message),
            SdkError::DispatchFailure(_) => StreamsClientError::ConnectionError(message),
            _ => StreamsClientError::Other(message),
        },
    }
}

fn decode_record(record: Record) -> Result<ChangeRecord, StreamsClientError> {
    let change = record
        .dynamodb
        .as_ref()
        .ok_or(StreamsClientError::MissingField("Record.dynamodb"))?;
    let sequence_number = change
        .sequence_number
        .clone()
        .ok_or(StreamsClientError::MissingField("StreamRecord.SequenceNumber"))?;

    let mut decoded = ChangeRecord::new(sequence_number);
    if let Some(name) = record.event_name.as_ref() {
        decoded = decoded.with_event_name(name.as_str());
    }
    if let Some(created) = change.approximate_creation_date_time.as_ref() {
        match created.to_chrono_utc() {
            Ok(time) => decoded = decoded.with_creation_time(time),
            Err(e) => warn!(error = %e, "Unrepresentable record creation time"),
        }
    }
    Ok(decoded.with_raw(record))
}

#[async_trait]
impl StreamsClientTrait for Client {
    async fn list_shards(&self, stream_arn: &str) -> Result<Vec<ShardDescriptor>, StreamsClientError> {
        let mut shards = Vec::new();
        let mut exclusive_start: Option<String> = None;

        loop {
            let response = self
                .describe_stream()
                .stream_arn(stream_arn)
                .set_exclusive_start_shard_id(exclusive_start.take())
                .send()
                .await
                .map_err(classify)?;

            let description = response
                .stream_description
                .ok_or(StreamsClientError::MissingField("StreamDescription"))?;
            let page = description
                .shards
                .ok_or(StreamsClientError::MissingField("StreamDescription.Shards"))?;

            trace!(stream = %stream_arn, page_size = page.len(), "Listed shard page");

            for shard in page {
                let shard_id = shard
                    .shard_id
                    .ok_or(StreamsClientError::MissingField("Shard.ShardId"))?;
                shards.push(ShardDescriptor {
                    shard_id,
                    parent_shard_id: shard.parent_shard_id,
                });
            }

            match description.last_evaluated_shard_id {
                Some(last) => exclusive_start = Some(last),
                None => break,
            }
        }

        Ok(shards)
    }

    async fn get_shard_iterator(
        &self,
        stream_arn: &str,
        shard_id: &str,
        position: &IteratorPosition,
    ) -> Result<String, StreamsClientError> {
        let req = self
            .get_shard_iterator()
            .stream_arn(stream_arn)
            .shard_id(shard_id);

        let req = match position {
            IteratorPosition::TrimHorizon => req.shard_iterator_type(ShardIteratorType::TrimHorizon),
            IteratorPosition::AfterSequenceNumber(seq) => req
                .shard_iterator_type(ShardIteratorType::AfterSequenceNumber)
                .sequence_number(seq),
        };

        let response = req.send().await.map_err(classify)?;
        response
            .shard_iterator
            .ok_or(StreamsClientError::MissingField("ShardIterator"))
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: Option<i32>,
    ) -> Result<RecordBatch, StreamsClientError> {
        let response = self
            .get_records()
            .shard_iterator(iterator)
            .set_limit(limit)
            .send()
            .await
            .map_err(classify)?;

        let records = response
            .records
            .unwrap_or_default()
            .into_iter()
            .map(decode_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecordBatch::new(records, response.next_shard_iterator))
    }
}

/// Streams client configured from the environment (region, credentials, profile)
pub async fn client_from_env() -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    Client::new(&config)
}
