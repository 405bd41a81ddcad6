use std::time::Duration;
use thiserror::Error;

use crate::error::CheckpointError;

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Maximum retries ({0}) exceeded: {1}")]
    MaxRetriesExceeded(u32, String),
}

impl RetryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout(_))
    }

    pub fn is_max_retries(&self) -> bool {
        matches!(self, RetryError::MaxRetriesExceeded(_, _))
    }

    /// Convert into a store error, using `save` to pick the direction
    pub(crate) fn into_checkpoint_error(self, save: bool) -> CheckpointError {
        let message = self.to_string();
        if save {
            CheckpointError::SaveFailed(message)
        } else {
            CheckpointError::LoadFailed(message)
        }
    }
}
