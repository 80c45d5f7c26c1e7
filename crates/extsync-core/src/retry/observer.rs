//! Retry observation and logging
//!
//! This module provides the `RetryObserver` trait for monitoring the retry
//! chain and a `TracingObserver` implementation that logs using the `tracing`
//! crate.

use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Observer trait for retry chain events
///
/// Every callback receives the unit's label (usually the extension id) so
/// one observer can serve a whole batch.
pub trait RetryObserver: Send + Sync {
    /// Called when an attempt is about to start (`attempt` is 1-indexed)
    fn on_attempt_start(&self, label: &str, attempt: u32, max_attempts: u32);

    /// Called when an attempt fails and a strategy will retry it
    fn on_strategy_applied(
        &self,
        label: &str,
        attempt: u32,
        error: &dyn Error,
        strategy: &str,
        delay: Duration,
    );

    /// Called when the operation succeeds
    fn on_success(&self, label: &str, attempt: u32, total_duration: Duration);

    /// Called when the chain gives up (attempt limit or no matching strategy)
    fn on_exhausted(&self, label: &str, attempts: u32, final_error: &dyn Error);

    /// Called when a fatal error short-circuits the chain
    fn on_fatal(&self, label: &str, attempt: u32, error: &dyn Error) {
        let _ = (label, attempt, error);
    }

    /// Called when a strategy decides to skip the item or abort the batch
    fn on_halted(&self, label: &str, attempt: u32, strategy: &str, abort: bool) {
        let _ = (label, attempt, strategy, abort);
    }
}

/// A no-op observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _label: &str, _attempt: u32, _max_attempts: u32) {}

    fn on_strategy_applied(
        &self,
        _label: &str,
        _attempt: u32,
        _error: &dyn Error,
        _strategy: &str,
        _delay: Duration,
    ) {
    }

    fn on_success(&self, _label: &str, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _label: &str, _attempts: u32, _final_error: &dyn Error) {}
}

/// An observer that logs retry events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_strategy_applied`: WARN
/// - `on_success`: INFO (if > 1 attempt) or DEBUG (first attempt)
/// - `on_exhausted`: ERROR
/// - `on_fatal`, `on_halted`: WARN
#[derive(Debug, Clone)]
pub struct TracingObserver {
    /// Name of the operation being retried (for log context)
    operation: String,
}

impl TracingObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, label: &str, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            operation = %self.operation,
            id = %label,
            attempt = attempt,
            max_attempts = max_attempts,
            "starting attempt"
        );
    }

    fn on_strategy_applied(
        &self,
        label: &str,
        attempt: u32,
        error: &dyn Error,
        strategy: &str,
        delay: Duration,
    ) {
        tracing::warn!(
            operation = %self.operation,
            id = %label,
            attempt = attempt,
            error = %error,
            strategy = strategy,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, label: &str, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                id = %label,
                attempt = attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                id = %label,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, label: &str, attempts: u32, final_error: &dyn Error) {
        tracing::error!(
            operation = %self.operation,
            id = %label,
            attempts = attempts,
            error = %final_error,
            "all retry attempts exhausted"
        );
    }

    fn on_fatal(&self, label: &str, attempt: u32, error: &dyn Error) {
        tracing::warn!(
            operation = %self.operation,
            id = %label,
            attempt = attempt,
            error = %error,
            "not retrying fatal error"
        );
    }

    fn on_halted(&self, label: &str, attempt: u32, strategy: &str, abort: bool) {
        tracing::warn!(
            operation = %self.operation,
            id = %label,
            attempt = attempt,
            strategy = strategy,
            abort = abort,
            "retry halted by strategy"
        );
    }
}

/// An observer that counts retry events
///
/// Useful for testing and metrics collection.
#[derive(Debug, Default)]
pub struct StatsObserver {
    pub attempt_starts: AtomicU32,
    pub strategies_applied: AtomicU32,
    pub successes: AtomicU32,
    pub exhaustions: AtomicU32,
    pub fatals: AtomicU32,
    pub halts: AtomicU32,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    pub fn strategies_applied(&self) -> u32 {
        self.strategies_applied.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    pub fn fatals(&self) -> u32 {
        self.fatals.load(Ordering::SeqCst)
    }

    pub fn halts(&self) -> u32 {
        self.halts.load(Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _label: &str, _attempt: u32, _max_attempts: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_strategy_applied(
        &self,
        _label: &str,
        _attempt: u32,
        _error: &dyn Error,
        _strategy: &str,
        _delay: Duration,
    ) {
        self.strategies_applied.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success(&self, _label: &str, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _label: &str, _attempts: u32, _final_error: &dyn Error) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_fatal(&self, _label: &str, _attempt: u32, _error: &dyn Error) {
        self.fatals.fetch_add(1, Ordering::SeqCst);
    }

    fn on_halted(&self, _label: &str, _attempt: u32, _strategy: &str, _abort: bool) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Implement RetryObserver for Arc<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_attempt_start(&self, label: &str, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(label, attempt, max_attempts)
    }

    fn on_strategy_applied(
        &self,
        label: &str,
        attempt: u32,
        error: &dyn Error,
        strategy: &str,
        delay: Duration,
    ) {
        (**self).on_strategy_applied(label, attempt, error, strategy, delay)
    }

    fn on_success(&self, label: &str, attempt: u32, total_duration: Duration) {
        (**self).on_success(label, attempt, total_duration)
    }

    fn on_exhausted(&self, label: &str, attempts: u32, final_error: &dyn Error) {
        (**self).on_exhausted(label, attempts, final_error)
    }

    fn on_fatal(&self, label: &str, attempt: u32, error: &dyn Error) {
        (**self).on_fatal(label, attempt, error)
    }

    fn on_halted(&self, label: &str, attempt: u32, strategy: &str, abort: bool) {
        (**self).on_halted(label, attempt, strategy, abort)
    }
}
