//! Per-shard polling
//!
//! A [`ShardPoller`] owns one shard for one walk. It first takes the entry decision
//! ([`ShardPoller::admit`]), then, if admitted, reads the shard until one of:
//!
//! - the stream returns no next iterator: the shard is marked closed and the walker is
//!   told to look for children,
//! - the run deadline passes: progress is left as is so a later run can resume,
//! - the walk asks every poller to stop because a sibling failed,
//! - a wire call or a handler fails.
//!
//! Records are delivered strictly one at a time. For each record the record handler is
//! awaited, the state table advanced, and the status handler awaited before the next
//! record is touched.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::client::StreamsClientTrait;
use crate::consumer::ConsumerContext;
use crate::error::{ConsumerError, Result};
use crate::monitoring::{ConsumerEvent, SkipReason};
use crate::state::{Admission, ShardProgress};
use crate::types::{ChangeRecord, IteratorPosition, ShardDescriptor};

/// How a poller finished without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    /// Entry decision said not to poll
    Skipped,
    /// Shard drained and checkpointed as closed; children may now be walked
    Closed,
    /// Run deadline passed with the iterator still open
    DeadlineReached,
    /// The enclosing walk requested a stop
    Interrupted,
}

/// Resolves once the walk flips the shutdown flag. Never resolves if the walk is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        futures::future::pending::<()>().await;
    }
}

pub(crate) struct ShardPoller<C: StreamsClientTrait + 'static> {
    ctx: Arc<ConsumerContext<C>>,
    shard: ShardDescriptor,
    shutdown: watch::Receiver<bool>,
}

impl<C: StreamsClientTrait + 'static> ShardPoller<C> {
    pub(crate) fn new(
        ctx: Arc<ConsumerContext<C>>,
        shard: ShardDescriptor,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            shard,
            shutdown,
        }
    }

    fn shard_id(&self) -> &str {
        &self.shard.shard_id
    }

    /// Entry decision. Marks a first-time shard `New` in the state table.
    pub(crate) async fn admit(&self) -> Admission {
        let admission = self.ctx.table.admit(&self.shard);

        match &admission {
            Admission::SkipClosed => {
                debug!(shard_id = %self.shard_id(), "Skipping closed shard");
                self.ctx
                    .send_monitoring_event(ConsumerEvent::shard_skipped(
                        self.shard_id(),
                        SkipReason::Closed,
                    ))
                    .await;
            }
            Admission::SkipActiveParent => {
                debug!(
                    shard_id = %self.shard_id(),
                    parent = ?self.shard.parent_shard_id(),
                    "Skipping shard with active parent"
                );
                self.ctx
                    .send_monitoring_event(ConsumerEvent::shard_skipped(
                        self.shard_id(),
                        SkipReason::ActiveParent,
                    ))
                    .await;
            }
            Admission::ActivateNew => {
                info!(
                    shard_id = %self.shard_id(),
                    parent = ?self.shard.parent_shard_id(),
                    "New shard"
                );
            }
            Admission::Resume(seq) => {
                info!(
                    shard_id = %self.shard_id(),
                    parent = ?self.shard.parent_shard_id(),
                    sequence = %seq,
                    "Resuming shard"
                );
            }
        }

        admission
    }

    /// Poll the shard according to a previously taken entry decision
    pub(crate) async fn run(mut self, admission: Admission) -> Result<PollOutcome> {
        let position = match admission {
            Admission::SkipClosed | Admission::SkipActiveParent => {
                return Ok(PollOutcome::Skipped);
            }
            Admission::ActivateNew => {
                self.report_status(&ShardProgress::New).await?;
                self.ctx
                    .send_monitoring_event(ConsumerEvent::shard_activated(self.shard_id()))
                    .await;
                IteratorPosition::TrimHorizon
            }
            Admission::Resume(seq) => {
                self.ctx
                    .send_monitoring_event(ConsumerEvent::shard_resumed(self.shard_id(), &seq))
                    .await;
                IteratorPosition::AfterSequenceNumber(seq)
            }
        };

        let result = self.poll(position).await;

        match &result {
            Ok(PollOutcome::DeadlineReached) => {
                info!(shard_id = %self.shard_id(), "Run deadline reached, shard left resumable");
                self.ctx
                    .send_monitoring_event(ConsumerEvent::deadline_reached(self.shard_id()))
                    .await;
            }
            Ok(PollOutcome::Interrupted) => {
                debug!(shard_id = %self.shard_id(), "Polling interrupted");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(shard_id = %self.shard_id(), error = %e, "Shard polling failed");
                self.ctx
                    .send_monitoring_event(ConsumerEvent::shard_failed(
                        self.shard_id(),
                        e.to_string(),
                    ))
                    .await;
            }
        }

        result
    }

    async fn poll(&mut self, position: IteratorPosition) -> Result<PollOutcome> {
        let ctx = self.ctx.clone();
        let shard_id = self.shard.shard_id.clone();

        let mut iterator = tokio::select! {
            it = ctx.iterators.get_iterator(&shard_id, &position) => Some(it?),
            _ = shutdown_requested(&mut self.shutdown) => return Ok(PollOutcome::Interrupted),
        };

        loop {
            let Some(current) = iterator.take() else {
                return self.close().await;
            };

            if self.deadline_passed() {
                return Ok(PollOutcome::DeadlineReached);
            }
            if *self.shutdown.borrow() {
                return Ok(PollOutcome::Interrupted);
            }

            let fetch_start = Instant::now();
            let batch = tokio::select! {
                batch = ctx.iterators.get_records(&shard_id, &current) => batch?,
                _ = shutdown_requested(&mut self.shutdown) => return Ok(PollOutcome::Interrupted),
            };

            let record_count = batch.records.len();
            trace!(shard_id = %shard_id, records = record_count, "Got batch");
            ctx.send_monitoring_event(ConsumerEvent::batch_fetched(
                &shard_id,
                record_count,
                fetch_start.elapsed(),
            ))
            .await;

            for record in &batch.records {
                self.deliver(record).await?;
            }

            iterator = batch.next_iterator;

            if iterator.is_some() {
                let pause = if record_count > 0 {
                    ctx.config.busy_poll_delay
                } else {
                    ctx.config.idle_poll_delay
                };
                if !self.pause(pause).await {
                    return Ok(PollOutcome::Interrupted);
                }
            }
        }
    }

    /// Deliver one record, then checkpoint it
    async fn deliver(&self, record: &ChangeRecord) -> Result<()> {
        let sequence = record.sequence_number();

        self.ctx
            .record_handler
            .handle_record(self.ctx.iterators.stream_arn(), &self.shard, record)
            .await
            .map_err(|source| ConsumerError::RecordHandler {
                shard_id: self.shard.shard_id.clone(),
                sequence_number: sequence.to_string(),
                source,
            })?;

        self.ctx.table.advance(self.shard_id(), sequence)?;
        self.report_status(&ShardProgress::At(sequence.to_string()))
            .await?;

        debug!(shard_id = %self.shard_id(), sequence = %sequence, "Checkpointed record");
        self.ctx
            .send_monitoring_event(ConsumerEvent::record_checkpointed(self.shard_id(), sequence))
            .await;
        Ok(())
    }

    async fn close(&self) -> Result<PollOutcome> {
        self.ctx.table.close(self.shard_id());
        self.report_status(&ShardProgress::Closed).await?;

        info!(shard_id = %self.shard_id(), "Shard closed");
        self.ctx
            .send_monitoring_event(ConsumerEvent::shard_closed(self.shard_id()))
            .await;
        Ok(PollOutcome::Closed)
    }

    async fn report_status(&self, status: &ShardProgress) -> Result<()> {
        self.ctx
            .status_handler
            .handle_status(self.ctx.iterators.stream_arn(), &self.shard, status)
            .await
            .map_err(|source| ConsumerError::StatusHandler {
                shard_id: self.shard.shard_id.clone(),
                status: status.clone(),
                source,
            })
    }

    fn deadline_passed(&self) -> bool {
        self.ctx.deadline.is_some_and(|deadline| Utc::now() >= deadline)
    }

    /// Sleep between fetches. Returns false if a stop was requested meanwhile.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = shutdown_requested(&mut self.shutdown) => false,
        }
    }
}
