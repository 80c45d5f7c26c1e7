//! Per-unit retry state

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::failure::OperationError;

/// How a unit applies a fetched package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallPath {
    /// Through the editor CLI
    #[default]
    Standard,
    /// Unpacked straight into the extensions directory
    Direct,
}

/// Typed metadata strategies read and rewrite between attempts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryMetadata {
    pub install_path: InstallPath,

    /// Stop after fetching; do not apply
    pub skip_install: bool,

    /// The unit can degrade to fetch-only
    pub supports_download_only: bool,

    /// No human is available to answer prompts
    pub unattended: bool,

    /// Names of the strategies applied so far, oldest first
    pub applied_strategies: Vec<String>,
}

impl RetryMetadata {
    /// The most recently applied strategy
    pub fn last_strategy(&self) -> Option<&str> {
        self.applied_strategies.last().map(String::as_str)
    }
}

/// Mutable state threaded through successive attempts at one unit of work
///
/// Owned by one unit for its whole lifetime; never shared across units.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempts started so far
    pub attempt_count: u32,

    /// Error of the most recent failed attempt
    pub last_error: Option<OperationError>,

    pub start_time: Instant,

    /// Deadline for a single attempt
    pub timeout: Duration,

    pub max_attempts: u32,

    pub metadata: RetryMetadata,

    /// What is being retried, for logs and prompts (usually the extension id)
    pub label: String,
}

impl RetryContext {
    pub fn new(label: impl Into<String>, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            last_error: None,
            start_time: Instant::now(),
            timeout,
            max_attempts: max_attempts.max(1),
            metadata: RetryMetadata::default(),
            label: label.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: RetryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
