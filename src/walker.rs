//! Shard tree traversal
//!
//! A walk lists the stream, polls every shard matching its parent filter concurrently,
//! and finishes once all of them are done. When a poller closes its shard, the walk
//! enqueues a discovery job for that shard's children (after a settle delay, so the
//! listing has time to show the split) instead of recursing. The stream is re-listed for
//! every discovery. The only thing a walk remembers between jobs is which shards it has
//! already handed to a poller, so no shard is polled twice in one run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace};

use crate::client::StreamsClientTrait;
use crate::consumer::ConsumerContext;
use crate::error::{ConsumerError, Result};
use crate::monitoring::{ConsumerEvent, SkipReason};
use crate::poller::{shutdown_requested, PollOutcome, ShardPoller};
use crate::state::Admission;
use crate::types::ShardDescriptor;

/// What a finished walk task hands back to the walk loop
enum Step {
    Listed {
        parent: Option<String>,
        shards: Vec<ShardDescriptor>,
    },
    Polled {
        shard_id: String,
        outcome: PollOutcome,
    },
    Interrupted,
}

/// Order a listing so every shard comes after its parent, when that parent is listed too.
/// Otherwise the listing order is kept. Admission relies on this to see a deferred parent
/// before its children.
fn parents_first(shards: Vec<ShardDescriptor>) -> Vec<ShardDescriptor> {
    let parents: HashMap<&str, Option<&str>> = shards
        .iter()
        .map(|s| (s.shard_id(), s.parent_shard_id()))
        .collect();

    let depth = |shard: &ShardDescriptor| {
        let mut depth = 0usize;
        let mut cursor = shard.parent_shard_id();
        while let Some(parent) = cursor {
            match parents.get(parent) {
                Some(next) if depth < parents.len() => {
                    depth += 1;
                    cursor = *next;
                }
                _ => break,
            }
        }
        depth
    };

    let mut ranked: Vec<(usize, ShardDescriptor)> =
        shards.iter().map(|s| (depth(s), s.clone())).collect();
    ranked.sort_by_key(|(depth, _)| *depth);
    ranked.into_iter().map(|(_, shard)| shard).collect()
}

pub(crate) struct ShardTreeWalker<C: StreamsClientTrait + 'static> {
    ctx: Arc<ConsumerContext<C>>,
}

impl<C: StreamsClientTrait + 'static> ShardTreeWalker<C> {
    pub(crate) fn new(ctx: Arc<ConsumerContext<C>>) -> Self {
        Self { ctx }
    }

    /// Walk the shard tree from `parent`, or from every listed shard when `None`.
    ///
    /// Resolves when every admitted shard and every child walk it triggered has
    /// finished. On the first error the remaining pollers are asked to stop at their next
    /// safe point and that error is returned once they have.
    pub(crate) async fn walk(&self, parent: Option<&str>) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks: JoinSet<Result<Step>> = JoinSet::new();
        let mut first_error: Option<ConsumerError> = None;
        // shards handed to a poller during this walk; each is polled at most once
        let mut claimed: HashSet<String> = HashSet::new();

        self.spawn_discovery(&mut tasks, parent.map(String::from), false, shutdown_rx.clone());

        while let Some(joined) = tasks.join_next().await {
            let step = match joined.map_err(ConsumerError::from).and_then(|r| r) {
                Ok(step) => step,
                Err(e) => {
                    if first_error.is_none() {
                        error!(error = %e, "Walk failed, stopping remaining shards");
                        let _ = shutdown_tx.send(true);
                        first_error = Some(e);
                    } else {
                        debug!(error = %e, "Additional failure while stopping");
                    }
                    continue;
                }
            };

            if first_error.is_some() {
                continue;
            }

            match step {
                Step::Listed { parent, shards } => {
                    self.ctx
                        .send_monitoring_event(ConsumerEvent::shards_listed(
                            parent.as_deref(),
                            shards.len(),
                        ))
                        .await;
                    self.start_matching(
                        &mut tasks,
                        &mut claimed,
                        parent.as_deref(),
                        shards,
                        &shutdown_rx,
                    )
                    .await;
                }
                Step::Polled {
                    shard_id,
                    outcome: PollOutcome::Closed,
                } => {
                    debug!(shard_id = %shard_id, "Scheduling child discovery");
                    self.spawn_discovery(&mut tasks, Some(shard_id), true, shutdown_rx.clone());
                }
                Step::Polled { shard_id, outcome } => {
                    trace!(shard_id = %shard_id, ?outcome, "Poller finished");
                }
                Step::Interrupted => {}
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(parent = ?parent, "Shard walk complete");
                Ok(())
            }
        }
    }

    async fn start_matching(
        &self,
        tasks: &mut JoinSet<Result<Step>>,
        claimed: &mut HashSet<String>,
        parent: Option<&str>,
        shards: Vec<ShardDescriptor>,
        shutdown: &watch::Receiver<bool>,
    ) {
        let mut deferred: HashSet<String> = HashSet::new();

        for shard in parents_first(shards) {
            if let Some(parent) = parent {
                if shard.parent_shard_id() != Some(parent) {
                    trace!(shard_id = %shard.shard_id, filter = %parent, "Filtered out");
                    self.ctx
                        .send_monitoring_event(ConsumerEvent::shard_skipped(
                            &shard.shard_id,
                            SkipReason::Filtered,
                        ))
                        .await;
                    continue;
                }
            }

            // a parent can close while this loop is still admitting its listing, so its
            // child may already be polling when the closure walk lists it again
            if claimed.contains(shard.shard_id()) {
                debug!(shard_id = %shard.shard_id, "Shard already polled in this run");
                self.ctx
                    .send_monitoring_event(ConsumerEvent::shard_skipped(
                        &shard.shard_id,
                        SkipReason::AlreadyPolled,
                    ))
                    .await;
                continue;
            }

            // a parent deferred earlier in this listing has no table entry yet
            if shard.parent_shard_id().is_some_and(|p| deferred.contains(p)) {
                debug!(shard_id = %shard.shard_id, "Skipping shard behind deferred parent");
                self.ctx
                    .send_monitoring_event(ConsumerEvent::shard_skipped(
                        &shard.shard_id,
                        SkipReason::ActiveParent,
                    ))
                    .await;
                deferred.insert(shard.shard_id);
                continue;
            }

            let poller = ShardPoller::new(self.ctx.clone(), shard.clone(), shutdown.clone());
            let admission = poller.admit().await;
            let shard_id = shard.shard_id;
            match admission {
                Admission::SkipActiveParent => {
                    deferred.insert(shard_id.clone());
                }
                Admission::ActivateNew | Admission::Resume(_) => {
                    claimed.insert(shard_id.clone());
                }
                Admission::SkipClosed => {}
            }

            tasks.spawn(async move {
                let outcome = poller.run(admission).await?;
                Ok(Step::Polled { shard_id, outcome })
            });
        }
    }

    fn spawn_discovery(
        &self,
        tasks: &mut JoinSet<Result<Step>>,
        parent: Option<String>,
        settle: bool,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let ctx = self.ctx.clone();

        tasks.spawn(async move {
            if settle {
                tokio::select! {
                    _ = tokio::time::sleep(ctx.config.shard_settle_delay) => {}
                    _ = shutdown_requested(&mut shutdown) => return Ok(Step::Interrupted),
                }
            }

            let shards = tokio::select! {
                shards = ctx.iterators.list_shards() => shards?,
                _ = shutdown_requested(&mut shutdown) => return Ok(Step::Interrupted),
            };

            debug!(parent = ?parent, shards = shards.len(), "Listed shards for walk");
            Ok(Step::Listed { parent, shards })
        });
    }
}
