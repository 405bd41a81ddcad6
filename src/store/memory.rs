use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace};

use crate::error::CheckpointError;
use crate::state::{ProgressSnapshot, ShardProgress};
use crate::store::CheckpointStore;

/// Process-local store, mostly for tests and short-lived consumers
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointStore {
    snapshot: Arc<RwLock<ProgressSnapshot>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        debug!("Initializing in-memory checkpoint store");
        Self::default()
    }

    pub fn with_snapshot(snapshot: ProgressSnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load_snapshot(&self) -> Result<ProgressSnapshot, CheckpointError> {
        let snapshot = self.snapshot.read().await.clone();
        trace!(shards = snapshot.len(), "Loaded snapshot from memory");
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn save_progress(
        &self,
        shard_id: &str,
        progress: &ShardProgress,
    ) -> Result<(), CheckpointError> {
        self.snapshot
            .write()
            .await
            .insert(shard_id, progress.clone());
        trace!("Progress saved to memory");
        Ok(())
    }
}
