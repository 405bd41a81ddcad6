//! Retry with backoff for checkpoint store calls
//!
//! Stream calls are never retried here: a failed wire call fails the run and the caller
//! restarts from its last persisted snapshot.

mod backoff;
mod error;

pub use backoff::{Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
pub use error::RetryError;

use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts allowed, `None` to retry forever
    pub max_attempts: Option<u32>,
    /// Upper bound for a single attempt
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            attempt_timeout: Some(Duration::from_secs(10)),
        }
    }
}

pub struct RetryHandle<B: Backoff> {
    config: RetryConfig,
    backoff: B,
    attempts: u32,
}

impl<B: Backoff> RetryHandle<B> {
    pub fn new(config: RetryConfig, backoff: B) -> Self {
        Self {
            config,
            backoff,
            attempts: 0,
        }
    }

    /// Run `operation` until it succeeds or the attempt budget is spent
    pub async fn retry<F, Fut, T, E>(&mut self, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        loop {
            self.attempts += 1;
            trace!(attempt = self.attempts, "Executing operation");

            let failure = match self.config.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(Ok(value)) => return Ok(self.succeeded(value)),
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => RetryError::Timeout(limit).to_string(),
                },
                None => match operation().await {
                    Ok(value) => return Ok(self.succeeded(value)),
                    Err(e) => e.to_string(),
                },
            };

            if let Some(max) = self.config.max_attempts {
                if self.attempts >= max {
                    warn!(attempts = self.attempts, error = %failure, "Giving up");
                    return Err(RetryError::MaxRetriesExceeded(self.attempts, failure));
                }
            }

            let delay = self.backoff.next_delay(self.attempts - 1);
            warn!(
                attempt = self.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn succeeded<T>(&self, value: T) -> T {
        debug!(attempts = self.attempts, "Operation succeeded");
        value
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
