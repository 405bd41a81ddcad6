//! Go Zoom Dynamo Streams - a DynamoDB Streams change-data-capture consumer
//!
//! The consumer walks a stream's shard tree, never reading a child shard before its
//! parent has been fully drained, and delivers every record to an application handler
//! strictly in order. After each record the new shard progress is handed to a status
//! handler and awaited, so progress persisted there is always safe to resume from.
//!
//! A heartbeat watchdog catches a wedged stream client, and an optional run deadline
//! stops polling while keeping every shard resumable.

pub mod client;
pub mod consumer;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod iterator;
pub mod monitoring;
mod poller;
pub mod retry;
pub mod state;
pub mod store;
pub mod types;
mod walker;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;

#[cfg(test)]
mod tests;

pub use client::{client_from_env, StreamsClientError, StreamsClientTrait};
pub use consumer::{ConsumerConfig, StreamConsumer};
pub use error::{CheckpointError, ConsumerError, Result, StateError};
pub use handler::{NoopHandler, RecordHandler, StatusHandler};
pub use heartbeat::{FatalSignal, HeartbeatAction};
pub use retry::{Backoff, ExponentialBackoff};
pub use state::{ProgressSnapshot, ShardProgress};
pub use types::{ChangeRecord, IteratorPosition, RecordBatch, ShardDescriptor};

// Re-export checkpoint stores
pub use store::{CheckpointStore, InMemoryCheckpointStore, JsonFileCheckpointStore, StoreStatusHandler};

#[cfg(feature = "dynamodb-store")]
pub use store::DynamoDbCheckpointStore;
