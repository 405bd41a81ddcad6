//! Error types for the stream consumer

use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

use crate::client::StreamsClientError;
use crate::state::ShardProgress;

/// Main error type for consumer operations
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Failed to list shards: {0}")]
    ListShardsFailed(#[source] StreamsClientError),

    #[error("Failed to get iterator for shard {shard_id}: {source}")]
    GetIteratorFailed {
        shard_id: String,
        #[source]
        source: StreamsClientError,
    },

    #[error("Failed to get records for shard {shard_id}: {source}")]
    GetRecordsFailed {
        shard_id: String,
        #[source]
        source: StreamsClientError,
    },

    #[error("Malformed response: missing {0}")]
    MalformedResponse(&'static str),

    #[error("Record handler failed for shard {shard_id} at {sequence_number}: {source}")]
    RecordHandler {
        shard_id: String,
        sequence_number: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Status handler failed for shard {shard_id} ({status}): {source}")]
    StatusHandler {
        shard_id: String,
        status: ShardProgress,
        #[source]
        source: anyhow::Error,
    },

    #[error("Shard state error: {0}")]
    State(#[from] StateError),

    #[error("No successful stream call for {idle:?}")]
    HeartbeatExpired { idle: Duration },

    #[error("Consumer is already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConsumerError {
    /// Whether this error came from the wire rather than from the application or local state
    pub fn is_wire_error(&self) -> bool {
        matches!(
            self,
            ConsumerError::ListShardsFailed(_)
                | ConsumerError::GetIteratorFailed { .. }
                | ConsumerError::GetRecordsFailed { .. }
                | ConsumerError::MalformedResponse(_)
        )
    }
}

impl From<JoinError> for ConsumerError {
    fn from(err: JoinError) -> Self {
        ConsumerError::Other(err.into())
    }
}

impl From<CheckpointError> for ConsumerError {
    fn from(err: CheckpointError) -> Self {
        ConsumerError::Other(err.into())
    }
}

/// Result type for consumer operations
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Violations of the shard progress lifecycle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Shard {0} is closed and cannot advance")]
    AlreadyClosed(String),

    #[error("Shard {shard_id} sequence moved backwards from {current} to {next}")]
    Regression {
        shard_id: String,
        current: String,
        next: String,
    },

    #[error("Invalid progress value: {0:?}")]
    InvalidProgress(String),
}

/// Error type for checkpoint store operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to save checkpoint: {0}")]
    SaveFailed(String),

    #[error("Failed to load checkpoints: {0}")]
    LoadFailed(String),

    #[error("Invalid checkpoint data: {0}")]
    InvalidData(String),
}
