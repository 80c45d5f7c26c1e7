//! Backoff calculation and recovery strategies
//!
//! A [`RecoveryStrategy`] inspects a failed attempt and either rewrites the
//! [`RetryContext`] for the next attempt or ends the unit. The standard set,
//! in ascending priority:
//!
//! | priority | name | handles |
//! |---|---|---|
//! | 5 | `network-retry` | network failures, configured backoff |
//! | 10 | `timeout-increase` | per-attempt deadline elapsed, doubles it |
//! | 20 | `direct-fallback` | install/CLI failures, switches to direct unpacking |
//! | 30 | `download-only-fallback` | install keeps failing, fetch without applying |
//! | 100 | `user-intervention` | anything after two attempts, asks the user |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::failure::{ErrorKind, OperationError};
use crate::types::{RetryPolicy, RetryStrategy};

use super::context::{InstallPath, RetryContext};

/// Calculate the delay before the next retry attempt
///
/// `attempt` is 1-indexed. Jitter adds up to 25% on top of the capped delay.
///
/// ```rust
/// use extsync_core::retry::calculate_delay;
/// use extsync_core::types::{RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     strategy: RetryStrategy::ExponentialBackoff,
///     backoff_multiplier: 2.0,
///     initial_delay_ms: 1000,
///     max_delay_ms: 30000,
///     jitter: false,
/// };
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 1000);
/// assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 2000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,

        RetryStrategy::FixedDelay => policy.initial_delay_ms,

        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(attempt_index as f64);
            (policy.initial_delay_ms as f64 * multiplier) as u64
        }

        RetryStrategy::LinearBackoff => policy.initial_delay_ms * (attempt_index as u64 + 1),
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms > 0 {
        let jitter_range = capped_delay_ms / 4;
        let jitter_value = rand::rng().random_range(0..=jitter_range);
        capped_delay_ms + jitter_value
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// What the chain does after a strategy has prepared the context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Wait `delay`, then run the task again with the rewritten context
    Retry { delay: Duration },
    /// Give up on this item only
    SkipItem,
    /// Stop the whole batch from accepting new work
    AbortBatch,
}

impl RecoveryAction {
    pub fn retry_now() -> Self {
        RecoveryAction::Retry {
            delay: Duration::ZERO,
        }
    }
}

/// One escalation step of the retry chain
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first
    fn priority(&self) -> u32;

    fn can_handle(&self, error: &OperationError, ctx: &RetryContext) -> bool;

    /// Rewrite `ctx` for the next attempt and say how to proceed
    async fn prepare(&self, error: &OperationError, ctx: &mut RetryContext) -> RecoveryAction;
}

/// Retries network failures with the configured backoff
///
/// Gives up once `policy.max_attempts` attempts have been made, even if the
/// chain as a whole would allow more.
#[derive(Debug, Clone)]
pub struct NetworkRetry {
    policy: RetryPolicy,
}

impl NetworkRetry {
    pub const NAME: &'static str = "network-retry";

    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl Default for NetworkRetry {
    fn default() -> Self {
        Self::new(RetryPolicy {
            max_attempts: 5,
            strategy: RetryStrategy::ExponentialBackoff,
            backoff_multiplier: 2.0,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter: false,
        })
    }
}

#[async_trait]
impl RecoveryStrategy for NetworkRetry {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u32 {
        5
    }

    fn can_handle(&self, error: &OperationError, ctx: &RetryContext) -> bool {
        error.kind == ErrorKind::Network && ctx.attempt_count < self.policy.max_attempts
    }

    async fn prepare(&self, _error: &OperationError, ctx: &mut RetryContext) -> RecoveryAction {
        RecoveryAction::Retry {
            delay: calculate_delay(&self.policy, ctx.attempt_count, self.policy.jitter),
        }
    }
}

/// Doubles the per-attempt deadline after a timeout
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutIncrease;

impl TimeoutIncrease {
    pub const NAME: &'static str = "timeout-increase";
}

#[async_trait]
impl RecoveryStrategy for TimeoutIncrease {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u32 {
        10
    }

    fn can_handle(&self, error: &OperationError, ctx: &RetryContext) -> bool {
        error.kind == ErrorKind::Timeout && ctx.attempt_count < 3
    }

    async fn prepare(&self, _error: &OperationError, ctx: &mut RetryContext) -> RecoveryAction {
        ctx.timeout = ctx.timeout.saturating_mul(2);
        RecoveryAction::retry_now()
    }
}

/// Switches a failing CLI install to direct unpacking
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectFallback;

impl DirectFallback {
    pub const NAME: &'static str = "direct-fallback";
}

#[async_trait]
impl RecoveryStrategy for DirectFallback {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u32 {
        20
    }

    fn can_handle(&self, error: &OperationError, ctx: &RetryContext) -> bool {
        matches!(error.kind, ErrorKind::Install | ErrorKind::Cli)
            && ctx.metadata.install_path != InstallPath::Direct
            && ctx.attempt_count < 2
    }

    async fn prepare(&self, _error: &OperationError, ctx: &mut RetryContext) -> RecoveryAction {
        ctx.metadata.install_path = InstallPath::Direct;
        RecoveryAction::retry_now()
    }
}

/// Degrades a repeatedly failing install to fetch-without-apply
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOnlyFallback;

impl DownloadOnlyFallback {
    pub const NAME: &'static str = "download-only-fallback";
}

#[async_trait]
impl RecoveryStrategy for DownloadOnlyFallback {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u32 {
        30
    }

    fn can_handle(&self, error: &OperationError, ctx: &RetryContext) -> bool {
        error.kind == ErrorKind::Install
            && ctx.metadata.supports_download_only
            && !ctx.metadata.skip_install
            && ctx.attempt_count >= 2
    }

    async fn prepare(&self, _error: &OperationError, ctx: &mut RetryContext) -> RecoveryAction {
        ctx.metadata.skip_install = true;
        RecoveryAction::retry_now()
    }
}

/// A user's answer to a failing item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionDecision {
    Retry,
    Skip,
    Abort,
}

/// Asks a human what to do about a failing item
#[async_trait]
pub trait InterventionHandler: Send + Sync {
    async fn decide(
        &self,
        label: &str,
        error: &OperationError,
        ctx: &RetryContext,
    ) -> InterventionDecision;
}

/// Hands the decision to an [`InterventionHandler`]
pub struct UserIntervention {
    handler: Arc<dyn InterventionHandler>,
}

impl UserIntervention {
    pub const NAME: &'static str = "user-intervention";

    pub fn new(handler: Arc<dyn InterventionHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl RecoveryStrategy for UserIntervention {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u32 {
        100
    }

    fn can_handle(&self, _error: &OperationError, ctx: &RetryContext) -> bool {
        ctx.attempt_count >= 2 && !ctx.metadata.unattended
    }

    async fn prepare(&self, error: &OperationError, ctx: &mut RetryContext) -> RecoveryAction {
        match self.handler.decide(&ctx.label, error, ctx).await {
            InterventionDecision::Retry => RecoveryAction::retry_now(),
            InterventionDecision::Skip => RecoveryAction::SkipItem,
            InterventionDecision::Abort => RecoveryAction::AbortBatch,
        }
    }
}

/// The standard strategies; user intervention only when a handler is given
pub fn standard_strategies(
    network: RetryPolicy,
    intervention: Option<Arc<dyn InterventionHandler>>,
) -> Vec<Arc<dyn RecoveryStrategy>> {
    let mut strategies: Vec<Arc<dyn RecoveryStrategy>> = vec![
        Arc::new(NetworkRetry::new(network)),
        Arc::new(TimeoutIncrease),
        Arc::new(DirectFallback),
        Arc::new(DownloadOnlyFallback),
    ];
    if let Some(handler) = intervention {
        strategies.push(Arc::new(UserIntervention::new(handler)));
    }
    strategies
}
