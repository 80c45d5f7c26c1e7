//! Terminal failures of the retry chain
//!
//! Skip and abort decisions are ordinary variants here, so callers match on
//! them instead of inspecting error messages.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::failure::OperationError;

/// Why the chain stopped without a success
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError {
    /// The failure was fatal and never retried
    NonRetryable { attempts: u32, error: OperationError },

    /// `max_attempts` was reached
    Exhausted {
        attempts: u32,
        error: OperationError,
        total_duration: Duration,
    },

    /// No strategy accepted the failure
    NoStrategy { attempts: u32, error: OperationError },

    /// The user chose to skip this item
    Skipped { attempts: u32, error: OperationError },

    /// The user chose to abort the whole batch
    Aborted { attempts: u32, error: OperationError },
}

impl fmt::Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::NonRetryable { error, .. } => write!(f, "{}", error),
            RetryError::Exhausted {
                attempts,
                error,
                total_duration,
            } => write!(
                f,
                "retry exhausted after {} attempts over {:.2}s: {}",
                attempts,
                total_duration.as_secs_f64(),
                error
            ),
            RetryError::NoStrategy { error, .. } => write!(f, "{}", error),
            RetryError::Skipped { error, .. } => write!(f, "skipped by user: {}", error),
            RetryError::Aborted { error, .. } => write!(f, "aborted by user: {}", error),
        }
    }
}

impl Error for RetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.error())
    }
}

impl RetryError {
    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::NonRetryable { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::NoStrategy { attempts, .. }
            | RetryError::Skipped { attempts, .. }
            | RetryError::Aborted { attempts, .. } => *attempts,
        }
    }

    /// The error of the final attempt
    pub fn error(&self) -> &OperationError {
        match self {
            RetryError::NonRetryable { error, .. }
            | RetryError::Exhausted { error, .. }
            | RetryError::NoStrategy { error, .. }
            | RetryError::Skipped { error, .. }
            | RetryError::Aborted { error, .. } => error,
        }
    }

    pub fn into_error(self) -> OperationError {
        match self {
            RetryError::NonRetryable { error, .. }
            | RetryError::Exhausted { error, .. }
            | RetryError::NoStrategy { error, .. }
            | RetryError::Skipped { error, .. }
            | RetryError::Aborted { error, .. } => error,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RetryError::Skipped { .. })
    }

    /// The batch must stop accepting new work
    pub fn is_aborted(&self) -> bool {
        matches!(self, RetryError::Aborted { .. })
    }
}
