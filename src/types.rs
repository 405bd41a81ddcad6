//! Wire-level data shapes shared by the client, the pollers and the handlers

use aws_sdk_dynamodbstreams::types::Record;
use chrono::{DateTime, Utc};

/// A shard as reported by a stream listing
///
/// Descriptors are re-fetched on every walk and never cached by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardDescriptor {
    pub shard_id: String,
    pub parent_shard_id: Option<String>,
}

impl ShardDescriptor {
    pub fn new(shard_id: impl Into<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
            parent_shard_id: None,
        }
    }

    pub fn with_parent(shard_id: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
            parent_shard_id: Some(parent.into()),
        }
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn parent_shard_id(&self) -> Option<&str> {
        self.parent_shard_id.as_deref()
    }
}

/// Where a new iterator should start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IteratorPosition {
    /// Oldest record still retained for the shard
    TrimHorizon,
    /// Strictly after the given sequence number
    AfterSequenceNumber(String),
}

/// One change record delivered to the record handler
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    sequence_number: String,
    event_name: Option<String>,
    approximate_creation_time: Option<DateTime<Utc>>,
    raw: Option<Record>,
}

impl ChangeRecord {
    pub fn new(sequence_number: impl Into<String>) -> Self {
        Self {
            sequence_number: sequence_number.into(),
            event_name: None,
            approximate_creation_time: None,
            raw: None,
        }
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }

    pub fn with_creation_time(mut self, time: DateTime<Utc>) -> Self {
        self.approximate_creation_time = Some(time);
        self
    }

    pub fn with_raw(mut self, raw: Record) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn sequence_number(&self) -> &str {
        &self.sequence_number
    }

    /// `INSERT`, `MODIFY` or `REMOVE` for table streams
    pub fn event_name(&self) -> Option<&str> {
        self.event_name.as_deref()
    }

    pub fn approximate_creation_time(&self) -> Option<&DateTime<Utc>> {
        self.approximate_creation_time.as_ref()
    }

    /// The SDK record this change was decoded from, when it came off the wire
    pub fn raw(&self) -> Option<&Record> {
        self.raw.as_ref()
    }
}

/// Result of one GetRecords call
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<ChangeRecord>,
    /// `None` means the shard is closed and fully read
    pub next_iterator: Option<String>,
}

impl RecordBatch {
    pub fn new(records: Vec<ChangeRecord>, next_iterator: Option<String>) -> Self {
        Self {
            records,
            next_iterator,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_iterator.is_none()
    }
}
