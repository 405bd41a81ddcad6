//! Durable homes for shard progress
//!
//! A [`CheckpointStore`] persists the per-shard progress the consumer reports through its
//! status handler, and hands the whole map back as a [`ProgressSnapshot`] for the next run.
//! [`StoreStatusHandler`] connects the two.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

#[cfg(feature = "dynamodb-store")]
pub mod dynamodb;
pub mod file;
pub mod memory;

use crate::error::CheckpointError;
use crate::handler::StatusHandler;
use crate::state::{ProgressSnapshot, ShardProgress};
use crate::types::ShardDescriptor;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Everything persisted so far; empty for a first run
    async fn load_snapshot(&self) -> Result<ProgressSnapshot, CheckpointError>;

    /// Persist one shard's progress. Must be durable when this returns.
    async fn save_progress(
        &self,
        shard_id: &str,
        progress: &ShardProgress,
    ) -> Result<(), CheckpointError>;
}

/// Status handler writing every status to a [`CheckpointStore`]
///
/// ```rust
/// use go_zoom_dynamo_streams::{InMemoryCheckpointStore, StoreStatusHandler};
///
/// let store = InMemoryCheckpointStore::new();
/// let handler = StoreStatusHandler::new(store.clone());
/// # let _ = handler;
/// ```
pub struct StoreStatusHandler<S: CheckpointStore> {
    store: Arc<S>,
}

impl<S: CheckpointStore> StoreStatusHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[async_trait]
impl<S: CheckpointStore + 'static> StatusHandler for StoreStatusHandler<S> {
    async fn handle_status(
        &self,
        _stream_arn: &str,
        shard: &ShardDescriptor,
        status: &ShardProgress,
    ) -> anyhow::Result<()> {
        trace!(shard_id = %shard.shard_id, %status, "Persisting shard status");
        self.store.save_progress(shard.shard_id(), status).await?;
        Ok(())
    }
}

// Re-export implementations
#[cfg(feature = "dynamodb-store")]
pub use dynamodb::DynamoDbCheckpointStore;
pub use file::JsonFileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
