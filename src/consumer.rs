//! Stream consumer entry point
//!
//! [`StreamConsumer`] wires the application's handlers to the shard walk:
//!
//! - restores shard progress from a prior snapshot, if one is given
//! - starts the heartbeat watchdog
//! - walks the whole shard tree, polling shards whose parents are drained
//! - stops the watchdog and resolves with the first error, or success
//!
//! # Examples
//!
//! ```rust,no_run
//! use go_zoom_dynamo_streams::{ConsumerConfig, ProgressSnapshot, StreamConsumer};
//! use std::time::Duration;
//!
//! async fn consume(
//!     client: aws_sdk_dynamodbstreams::Client,
//!     prior: ProgressSnapshot,
//! ) -> go_zoom_dynamo_streams::Result<ProgressSnapshot> {
//!     let config = ConsumerConfig {
//!         stream_arn: "arn:aws:dynamodb:us-east-1:123456789012:table/People/stream/2024-01-01T00:00:00.000".into(),
//!         ..Default::default()
//!     };
//!
//!     let (consumer, _monitoring_rx) = StreamConsumer::new(config, client, Some(prior));
//!     consumer.run_for(Duration::from_secs(300)).await?;
//!     Ok(consumer.progress())
//! }
//! ```

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, trace, warn};

use crate::client::StreamsClientTrait;
use crate::error::{ConsumerError, Result};
use crate::handler::{NoopHandler, RecordHandler, StatusHandler};
use crate::heartbeat::{FatalSignal, Heartbeat, HeartbeatAction, Watchdog};
use crate::iterator::ShardIteratorClient;
use crate::monitoring::{ConsumerEvent, MonitoringConfig};
use crate::state::{ProgressSnapshot, ShardStateTable};
use crate::walker::ShardTreeWalker;

/// Configuration for the stream consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// ARN of the DynamoDB stream to consume
    pub stream_arn: String,
    /// Pause after a batch that contained records
    pub busy_poll_delay: Duration,
    /// Pause after an empty batch
    pub idle_poll_delay: Duration,
    /// Wait between closing a shard and listing its children
    pub shard_settle_delay: Duration,
    /// Longest allowed gap between successful stream calls
    pub heartbeat_timeout: Duration,
    /// How often the watchdog checks the heartbeat
    pub heartbeat_check_interval: Duration,
    /// What to do once the heartbeat expires
    pub heartbeat_action: HeartbeatAction,
    /// Optional `Limit` for each GetRecords call
    pub batch_limit: Option<i32>,
    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_arn: String::new(),
            busy_poll_delay: Duration::from_millis(200),
            idle_poll_delay: Duration::from_millis(500),
            shard_settle_delay: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(60),
            heartbeat_check_interval: Duration::from_secs(1),
            heartbeat_action: HeartbeatAction::default(),
            batch_limit: None,
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl ConsumerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stream_arn.is_empty() {
            return Err(ConsumerError::ConfigError("stream_arn must be set".to_string()));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(ConsumerError::ConfigError(
                "heartbeat_timeout must be positive".to_string(),
            ));
        }
        if self.heartbeat_check_interval.is_zero() {
            return Err(ConsumerError::ConfigError(
                "heartbeat_check_interval must be positive".to_string(),
            ));
        }
        if let Some(limit) = self.batch_limit {
            if limit <= 0 {
                return Err(ConsumerError::ConfigError(format!(
                    "batch_limit must be positive, got {}",
                    limit
                )));
            }
        }
        if self.monitoring.enabled && self.monitoring.channel_size == 0 {
            return Err(ConsumerError::ConfigError(
                "monitoring.channel_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a walk and its pollers share for one run
pub(crate) struct ConsumerContext<C: StreamsClientTrait> {
    pub(crate) iterators: ShardIteratorClient<C>,
    pub(crate) table: Arc<ShardStateTable>,
    pub(crate) record_handler: Arc<dyn RecordHandler>,
    pub(crate) status_handler: Arc<dyn StatusHandler>,
    pub(crate) config: ConsumerConfig,
    pub(crate) deadline: Option<DateTime<Utc>>,
    monitoring_tx: Option<mpsc::Sender<ConsumerEvent>>,
}

impl<C: StreamsClientTrait> ConsumerContext<C> {
    /// Sends a monitoring event if monitoring is enabled
    pub(crate) async fn send_monitoring_event(&self, event: ConsumerEvent) {
        if let Some(tx) = &self.monitoring_tx {
            if let Err(e) = tx.send(event).await {
                warn!(error = %e, "Failed to send monitoring event");
            } else {
                trace!("Sent monitoring event");
            }
        }
    }
}

/// DynamoDB stream consumer
///
/// One instance serves one stream for one run.
pub struct StreamConsumer<C: StreamsClientTrait + 'static> {
    config: ConsumerConfig,
    client: Arc<C>,
    table: Arc<ShardStateTable>,
    record_handler: Option<Arc<dyn RecordHandler>>,
    status_handler: Option<Arc<dyn StatusHandler>>,
    monitoring_tx: Option<mpsc::Sender<ConsumerEvent>>,
    fatal_tx: Arc<watch::Sender<Option<FatalSignal>>>,
    started: AtomicBool,
}

impl<C: StreamsClientTrait + 'static> StreamConsumer<C> {
    /// Creates a consumer, resuming from `prior` when given
    ///
    /// Returns the consumer and, if monitoring is enabled, the receiving end of its
    /// event channel.
    pub fn new(
        config: ConsumerConfig,
        client: C,
        prior: Option<ProgressSnapshot>,
    ) -> (Self, Option<mpsc::Receiver<ConsumerEvent>>) {
        let (monitoring_tx, monitoring_rx) = if config.monitoring.enabled {
            let (tx, rx) = mpsc::channel(config.monitoring.channel_size.max(1));
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let table = match prior {
            Some(snapshot) => ShardStateTable::from_snapshot(snapshot),
            None => ShardStateTable::new(),
        };
        let (fatal_tx, _) = watch::channel(None);

        let consumer = Self {
            config,
            client: Arc::new(client),
            table: Arc::new(table),
            record_handler: None,
            status_handler: None,
            monitoring_tx,
            fatal_tx: Arc::new(fatal_tx),
            started: AtomicBool::new(false),
        };

        (consumer, monitoring_rx)
    }

    pub fn set_record_handler(&mut self, handler: impl RecordHandler + 'static) {
        self.record_handler = Some(Arc::new(handler));
    }

    pub fn set_status_handler(&mut self, handler: impl StatusHandler + 'static) {
        self.status_handler = Some(Arc::new(handler));
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Current progress of every shard seen so far, in the persisted layout
    pub fn progress(&self) -> ProgressSnapshot {
        self.table.snapshot()
    }

    /// Receives a [`FatalSignal`] when the watchdog fires in [`HeartbeatAction::Notify`] mode
    pub fn fatal_signal(&self) -> watch::Receiver<Option<FatalSignal>> {
        self.fatal_tx.subscribe()
    }

    /// Run until `deadline`, or until every reachable shard is closed when `None`.
    ///
    /// A deadline only stops shards between fetches; in-flight handler calls always
    /// finish. May be called once per instance.
    pub async fn run(&self, deadline: Option<DateTime<Utc>>) -> Result<()> {
        self.config.validate()?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ConsumerError::AlreadyRunning);
        }

        info!(
            stream = %self.config.stream_arn,
            deadline = ?deadline,
            shards_known = self.table.snapshot().len(),
            "Starting stream consumer"
        );

        let record_handler: Arc<dyn RecordHandler> = match &self.record_handler {
            Some(handler) => handler.clone(),
            None => Arc::new(NoopHandler),
        };
        let status_handler: Arc<dyn StatusHandler> = match &self.status_handler {
            Some(handler) => handler.clone(),
            None => Arc::new(NoopHandler),
        };

        let heartbeat = Arc::new(Heartbeat::new(self.config.heartbeat_timeout));
        let ctx = Arc::new(ConsumerContext {
            iterators: ShardIteratorClient::new(
                self.client.clone(),
                heartbeat.clone(),
                self.config.stream_arn.clone(),
                self.config.batch_limit,
            ),
            table: self.table.clone(),
            record_handler,
            status_handler,
            config: self.config.clone(),
            deadline,
            monitoring_tx: self.monitoring_tx.clone(),
        });

        let mut fatal_rx = self.fatal_tx.subscribe();
        let watchdog = Watchdog::start(
            heartbeat,
            self.config.heartbeat_check_interval,
            self.config.heartbeat_action,
            self.fatal_tx.clone(),
        );

        let walker = ShardTreeWalker::new(ctx.clone());
        let result = tokio::select! {
            result = walker.walk(None) => result,
            signal = fatal_rx.wait_for(Option::is_some) => {
                let idle = match signal {
                    Ok(signal) => signal.as_ref().map(|s| s.idle),
                    Err(_) => None,
                }
                .unwrap_or(self.config.heartbeat_timeout);
                ctx.send_monitoring_event(ConsumerEvent::heartbeat_expired(idle)).await;
                Err(ConsumerError::HeartbeatExpired { idle })
            }
        };

        watchdog.stop();

        match &result {
            Ok(()) => info!(stream = %self.config.stream_arn, "Stream consumer finished"),
            Err(e) => error!(stream = %self.config.stream_arn, error = %e, "Stream consumer failed"),
        }
        result
    }

    /// [`run`](Self::run) with a deadline `duration` from now
    pub async fn run_for(&self, duration: Duration) -> Result<()> {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|e| ConsumerError::ConfigError(format!("run duration out of range: {}", e)))?;
        self.run(Some(Utc::now() + duration)).await
    }
}
