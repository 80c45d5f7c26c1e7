//! Batch-level errors
//!
//! Per-item failures never surface here; they become failed
//! [`UnitOutcome`](extsync_core::types::UnitOutcome)s. Only conditions that
//! halt a whole batch are represented.

use extsync_core::types::Summary;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The planner produced a plan that breaks its own invariants
    #[error("Invalid plan for {id}: {reason}")]
    InvalidPlan { id: String, reason: String },

    /// The user aborted the batch; carries everything finished before the abort
    #[error("Batch aborted by user after {} of {} items", .0.items.len(), .0.to_update)]
    Aborted(Box<Summary>),

    /// Bookkeeping could not be read or written
    #[error("Failed to reconcile {path}: {message}")]
    Reconcile { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] extsync_core::Error),

    /// A collaborator failed outside any unit (listing installs, restoring a backup)
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl EngineError {
    pub fn invalid_plan(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn reconcile(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::Reconcile {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Partial summary of an aborted batch
    pub fn partial_summary(&self) -> Option<&Summary> {
        match self {
            EngineError::Aborted(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, EngineError::Aborted(_))
    }
}
