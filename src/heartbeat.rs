//! Liveness watchdog for the stream client
//!
//! Every successful wire call pushes the [`Heartbeat`] deadline forward. The [`Watchdog`]
//! checks that deadline on a fixed interval and, once it has passed, treats the client as
//! wedged: either the process exits or a [`FatalSignal`] is published, depending on the
//! configured [`HeartbeatAction`]. The deadline starts unset, so the watchdog stays dormant
//! until the first call succeeds.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace};

/// What the watchdog does once the heartbeat deadline has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Terminate the process immediately with the given exit code
    Exit(i32),
    /// Publish a [`FatalSignal`] and let the hosting process decide
    Notify,
}

impl Default for HeartbeatAction {
    fn default() -> Self {
        HeartbeatAction::Exit(1)
    }
}

/// Published when the watchdog fires in [`HeartbeatAction::Notify`] mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalSignal {
    /// How long it had been since the last successful call
    pub idle: Duration,
}

/// Shared heartbeat deadline, written by every successful call
#[derive(Debug)]
pub struct Heartbeat {
    timeout: Duration,
    deadline: Mutex<Option<Instant>>,
}

impl Heartbeat {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Mutex::new(None),
        }
    }

    /// Record a successful call
    pub fn beat(&self) {
        *self.deadline.lock() = Some(Instant::now() + self.timeout);
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }

    /// How far past the deadline we are, if the heartbeat is armed and expired
    pub fn overdue(&self, now: Instant) -> Option<Duration> {
        match *self.deadline.lock() {
            Some(deadline) if now > deadline => Some(now - deadline),
            _ => None,
        }
    }
}

/// Background task checking a [`Heartbeat`] once per interval
pub struct Watchdog {
    handle: JoinHandle<()>,
}

impl Watchdog {
    /// Spawn the watchdog onto the current runtime
    pub fn start(
        heartbeat: Arc<Heartbeat>,
        interval: Duration,
        action: HeartbeatAction,
        fatal_tx: Arc<watch::Sender<Option<FatalSignal>>>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(overdue) = heartbeat.overdue(Instant::now()) else {
                    trace!("Heartbeat ok");
                    continue;
                };

                let idle = heartbeat.timeout() + overdue;
                error!(idle_ms = idle.as_millis() as u64, "Heartbeat expired, stream client presumed wedged");

                match action {
                    HeartbeatAction::Exit(code) => std::process::exit(code),
                    HeartbeatAction::Notify => {
                        let _ = fatal_tx.send(Some(FatalSignal { idle }));
                        return;
                    }
                }
            }
        });

        debug!(interval_ms = interval.as_millis() as u64, "Watchdog started");
        Self { handle }
    }

    /// Stop checking. Idempotent.
    pub fn stop(&self) {
        self.handle.abort();
        debug!("Watchdog stopped");
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
