//! Application callbacks
//!
//! A consumer delivers every record to a [`RecordHandler`] and reports every progress
//! transition (`new`, a sequence number, `closed`) to a [`StatusHandler`]. Both are awaited:
//! the next record of a shard is not delivered until the status for the previous one has
//! been handled, so a status handler that persists progress gives checkpoint-before-continue.
//!
//! # Examples
//!
//! ```rust
//! use go_zoom_dynamo_streams::{ChangeRecord, RecordHandler, ShardDescriptor};
//!
//! struct PrintHandler;
//!
//! #[async_trait::async_trait]
//! impl RecordHandler for PrintHandler {
//!     async fn handle_record(
//!         &self,
//!         stream_arn: &str,
//!         shard: &ShardDescriptor,
//!         record: &ChangeRecord,
//!     ) -> anyhow::Result<()> {
//!         println!("{stream_arn} {} {}", shard.shard_id(), record.sequence_number());
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::state::ShardProgress;
use crate::types::{ChangeRecord, ShardDescriptor};

/// Receives each record of a shard, in order
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// Returning `Ok` means the record may be checkpointed. An error aborts the shard.
    async fn handle_record(
        &self,
        stream_arn: &str,
        shard: &ShardDescriptor,
        record: &ChangeRecord,
    ) -> anyhow::Result<()>;
}

/// Receives shard progress transitions
#[async_trait]
pub trait StatusHandler: Send + Sync {
    /// Returning `Ok` means the status is durably stored. An error aborts the shard.
    async fn handle_status(
        &self,
        stream_arn: &str,
        shard: &ShardDescriptor,
        status: &ShardProgress,
    ) -> anyhow::Result<()>;
}

/// Default handler: accepts everything immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

#[async_trait]
impl RecordHandler for NoopHandler {
    async fn handle_record(
        &self,
        _stream_arn: &str,
        _shard: &ShardDescriptor,
        _record: &ChangeRecord,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl StatusHandler for NoopHandler {
    async fn handle_status(
        &self,
        _stream_arn: &str,
        _shard: &ShardDescriptor,
        _status: &ShardProgress,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
