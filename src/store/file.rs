//! Snapshot persisted as one JSON document
//!
//! Every save rewrites the whole file through a temporary sibling and a rename, so a
//! reader never observes a half-written snapshot.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};

use crate::error::CheckpointError;
use crate::state::{ProgressSnapshot, ShardProgress};
use crate::store::CheckpointStore;

#[derive(Debug)]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
    // serializes writers and caches the last written snapshot
    current: Mutex<Option<ProgressSnapshot>>,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<ProgressSnapshot, CheckpointError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(ProgressSnapshot::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CheckpointError::InvalidData(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file yet");
                Ok(ProgressSnapshot::new())
            }
            Err(e) => Err(CheckpointError::LoadFailed(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_file(&self, snapshot: &ProgressSnapshot) -> Result<(), CheckpointError> {
        let save_failed = |e: std::io::Error| {
            CheckpointError::SaveFailed(format!("{}: {}", self.path.display(), e))
        };

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| CheckpointError::SaveFailed(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json).await.map_err(save_failed)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(save_failed)?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn load_snapshot(&self) -> Result<ProgressSnapshot, CheckpointError> {
        let mut current = self.current.lock().await;
        let snapshot = self.read_file().await?;
        debug!(path = %self.path.display(), shards = snapshot.len(), "Loaded snapshot");
        *current = Some(snapshot.clone());
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn save_progress(
        &self,
        shard_id: &str,
        progress: &ShardProgress,
    ) -> Result<(), CheckpointError> {
        let mut current = self.current.lock().await;
        let mut snapshot = match current.take() {
            Some(snapshot) => snapshot,
            None => self.read_file().await?,
        };

        snapshot.insert(shard_id, progress.clone());
        let written = self.write_file(&snapshot).await;
        *current = Some(snapshot);
        written?;

        trace!("Snapshot file rewritten");
        Ok(())
    }
}
