//! Per-shard progress tracking
//!
//! The [`ShardStateTable`] is the only state shared between pollers. Each entry is written
//! by its own shard's poller and read by the pollers of its children for parent gating.
//! Every operation is a single short critical section; the lock is never held across an
//! await point.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

use crate::error::StateError;
use crate::types::{IteratorPosition, ShardDescriptor};

const NEW: &str = "new";
const CLOSED: &str = "closed";

/// Checkpointed lifecycle of one shard
///
/// A shard never encountered has no entry at all. Entries only move forward:
/// `New` → `At(..)` (repeatedly, with advancing sequence numbers) → `Closed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ShardProgress {
    /// Observed, nothing delivered yet; read from the trim horizon
    New,
    /// Last checkpointed sequence number; read strictly after it
    At(String),
    /// Fully drained, never polled again
    Closed,
}

impl ShardProgress {
    pub fn is_closed(&self) -> bool {
        matches!(self, ShardProgress::Closed)
    }

    /// Iterator position a poller resumes from, `None` for closed shards
    pub fn resume_position(&self) -> Option<IteratorPosition> {
        match self {
            ShardProgress::New => Some(IteratorPosition::TrimHorizon),
            ShardProgress::At(seq) => Some(IteratorPosition::AfterSequenceNumber(seq.clone())),
            ShardProgress::Closed => None,
        }
    }
}

impl fmt::Display for ShardProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardProgress::New => f.write_str(NEW),
            ShardProgress::At(seq) => f.write_str(seq),
            ShardProgress::Closed => f.write_str(CLOSED),
        }
    }
}

impl FromStr for ShardProgress {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            NEW => Ok(ShardProgress::New),
            CLOSED => Ok(ShardProgress::Closed),
            "" => Err(StateError::InvalidProgress(s.to_string())),
            seq => Ok(ShardProgress::At(seq.to_string())),
        }
    }
}

impl From<ShardProgress> for String {
    fn from(progress: ShardProgress) -> Self {
        progress.to_string()
    }
}

impl TryFrom<String> for ShardProgress {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Persisted layout: shard id → sequence number, `"new"` or `"closed"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressSnapshot(BTreeMap<String, ShardProgress>);

impl ProgressSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, shard_id: &str) -> Option<&ShardProgress> {
        self.0.get(shard_id)
    }

    pub fn insert(&mut self, shard_id: impl Into<String>, progress: ShardProgress) {
        self.0.insert(shard_id.into(), progress);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ShardProgress)> {
        self.0.iter()
    }

    /// Build from the raw string map a caller persisted
    pub fn from_strings<I, K, V>(entries: I) -> Result<Self, StateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        entries
            .into_iter()
            .map(|(k, v)| Ok((k.into(), v.as_ref().parse()?)))
            .collect::<Result<BTreeMap<_, _>, StateError>>()
            .map(Self)
    }
}

impl FromIterator<(String, ShardProgress)> for ProgressSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, ShardProgress)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of the entry decision a poller makes before touching the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Shard already drained
    SkipClosed,
    /// Parent is known and still open; the shard waits for the parent's closure walk
    SkipActiveParent,
    /// First time polling this shard; it has just been marked `New`
    ActivateNew,
    /// Continue after the stored sequence number
    Resume(String),
}

/// Compare decimal sequence numbers without overflowing on 40-digit values.
/// Non-decimal values are not ordered.
fn compare_sequence(a: &str, b: &str) -> Option<Ordering> {
    let decimal = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if !decimal(a) || !decimal(b) {
        return None;
    }
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    Some(a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
}

/// In-memory table of shard progress, optionally seeded from a prior run
#[derive(Debug, Default)]
pub struct ShardStateTable {
    entries: RwLock<HashMap<String, ShardProgress>>,
}

impl ShardStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ProgressSnapshot) -> Self {
        debug!(shards = snapshot.len(), "Seeding shard state from snapshot");
        Self {
            entries: RwLock::new(snapshot.0.into_iter().collect()),
        }
    }

    pub fn get(&self, shard_id: &str) -> Option<ShardProgress> {
        self.entries.read().get(shard_id).cloned()
    }

    /// Decide whether a shard may be polled, marking first-time shards `New`.
    ///
    /// A parent with no entry at all counts as closed: it was never seen by this or any
    /// prior run, typically because retention already pruned it.
    pub fn admit(&self, shard: &ShardDescriptor) -> Admission {
        let mut entries = self.entries.write();

        let admission = match entries.get(shard.shard_id()) {
            Some(ShardProgress::Closed) => Admission::SkipClosed,
            current => {
                let parent_open = shard
                    .parent_shard_id()
                    .and_then(|parent| entries.get(parent))
                    .is_some_and(|p| !p.is_closed());

                if parent_open {
                    Admission::SkipActiveParent
                } else {
                    match current {
                        Some(ShardProgress::At(seq)) => Admission::Resume(seq.clone()),
                        _ => Admission::ActivateNew,
                    }
                }
            }
        };

        if admission == Admission::ActivateNew {
            entries.insert(shard.shard_id.clone(), ShardProgress::New);
        }

        trace!(shard_id = %shard.shard_id, ?admission, "Admission decided");
        admission
    }

    /// Record a delivered record's sequence number
    pub fn advance(&self, shard_id: &str, sequence_number: &str) -> Result<(), StateError> {
        let mut entries = self.entries.write();

        match entries.get(shard_id) {
            Some(ShardProgress::Closed) => {
                return Err(StateError::AlreadyClosed(shard_id.to_string()));
            }
            Some(ShardProgress::At(current))
                if compare_sequence(sequence_number, current) == Some(Ordering::Less) =>
            {
                return Err(StateError::Regression {
                    shard_id: shard_id.to_string(),
                    current: current.clone(),
                    next: sequence_number.to_string(),
                });
            }
            _ => {}
        }

        entries.insert(
            shard_id.to_string(),
            ShardProgress::At(sequence_number.to_string()),
        );
        Ok(())
    }

    /// Mark a shard fully drained
    pub fn close(&self, shard_id: &str) {
        self.entries
            .write()
            .insert(shard_id.to_string(), ShardProgress::Closed);
    }

    /// Point-in-time copy of every entry
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
