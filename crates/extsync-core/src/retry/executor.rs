//! Retry chain execution
//!
//! [`RetryChain::run`] drives one unit of work: it runs the task under the
//! context's per-attempt deadline, short-circuits fatal failures, and on any
//! other failure hands the context to the first matching strategy.

use std::future::Future;
use std::sync::Arc;

use crate::failure::OperationError;
use crate::types::RetryPolicy;

use super::context::RetryContext;
use super::error::RetryError;
use super::observer::{NoOpObserver, RetryObserver};
use super::strategies::{
    standard_strategies, InterventionHandler, RecoveryAction, RecoveryStrategy,
};

/// Outcome of one unit plus the context it finished with
#[derive(Debug)]
pub struct ChainReport<T> {
    pub result: Result<T, RetryError>,
    pub context: RetryContext,
}

impl<T> ChainReport<T> {
    pub fn attempts(&self) -> u32 {
        self.context.attempt_count
    }

    /// Most recent strategy that rewrote the context, if any
    pub fn last_strategy(&self) -> Option<&str> {
        self.context.metadata.last_strategy()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(&self.result, Err(err) if err.is_aborted())
    }
}

/// Builder for configuring a [`RetryChain`]
///
/// ```rust
/// use extsync_core::retry::{RetryChainBuilder, TracingObserver};
/// use extsync_core::types::RetryPolicy;
///
/// let chain = RetryChainBuilder::new()
///     .with_standard_strategies(RetryPolicy::default(), None)
///     .with_observer(TracingObserver::new("update"))
///     .build();
/// assert_eq!(chain.strategy_names()[0], "network-retry");
/// ```
pub struct RetryChainBuilder {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
    observer: Arc<dyn RetryObserver>,
}

impl Default for RetryChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryChainBuilder {
    /// An empty chain: every failure ends the unit
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            observer: Arc::new(NoOpObserver),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_standard_strategies(
        mut self,
        network: RetryPolicy,
        intervention: Option<Arc<dyn InterventionHandler>>,
    ) -> Self {
        self.strategies
            .extend(standard_strategies(network, intervention));
        self
    }

    pub fn with_observer<O: RetryObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn build(mut self) -> RetryChain {
        // Stable sort keeps insertion order among equal priorities
        self.strategies.sort_by_key(|s| s.priority());
        RetryChain {
            strategies: self.strategies,
            observer: self.observer,
        }
    }
}

/// An ordered set of recovery strategies
#[derive(Clone)]
pub struct RetryChain {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
    observer: Arc<dyn RetryObserver>,
}

impl RetryChain {
    pub fn builder() -> RetryChainBuilder {
        RetryChainBuilder::new()
    }

    /// Strategy names in evaluation order
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run `task` until it succeeds or the chain gives up
    ///
    /// The task receives a snapshot of the context for each attempt, so it
    /// can follow metadata rewritten by strategies (install path, skip
    /// install, timeout).
    pub async fn run<F, Fut, T>(&self, mut ctx: RetryContext, mut task: F) -> ChainReport<T>
    where
        F: FnMut(RetryContext) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        loop {
            ctx.attempt_count += 1;
            let attempt = ctx.attempt_count;
            self.observer
                .on_attempt_start(&ctx.label, attempt, ctx.max_attempts);

            let outcome = match tokio::time::timeout(ctx.timeout, task(ctx.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => Err(OperationError::timeout(format!(
                    "attempt {} timed out after {}ms",
                    attempt,
                    ctx.timeout.as_millis()
                ))),
            };

            let error = match outcome {
                Ok(value) => {
                    self.observer.on_success(&ctx.label, attempt, ctx.elapsed());
                    return ChainReport {
                        result: Ok(value),
                        context: ctx,
                    };
                }
                Err(error) => error,
            };

            ctx.last_error = Some(error.clone());

            if error.is_fatal() {
                self.observer.on_fatal(&ctx.label, attempt, &error);
                return ChainReport {
                    result: Err(RetryError::NonRetryable {
                        attempts: attempt,
                        error,
                    }),
                    context: ctx,
                };
            }

            if attempt >= ctx.max_attempts {
                self.observer.on_exhausted(&ctx.label, attempt, &error);
                let total_duration = ctx.elapsed();
                return ChainReport {
                    result: Err(RetryError::Exhausted {
                        attempts: attempt,
                        error,
                        total_duration,
                    }),
                    context: ctx,
                };
            }

            let Some(strategy) = self
                .strategies
                .iter()
                .find(|s| s.can_handle(&error, &ctx))
            else {
                self.observer.on_exhausted(&ctx.label, attempt, &error);
                return ChainReport {
                    result: Err(RetryError::NoStrategy {
                        attempts: attempt,
                        error,
                    }),
                    context: ctx,
                };
            };

            match strategy.prepare(&error, &mut ctx).await {
                RecoveryAction::Retry { delay } => {
                    ctx.metadata
                        .applied_strategies
                        .push(strategy.name().to_string());
                    self.observer.on_strategy_applied(
                        &ctx.label,
                        attempt,
                        &error,
                        strategy.name(),
                        delay,
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                RecoveryAction::SkipItem => {
                    self.observer
                        .on_halted(&ctx.label, attempt, strategy.name(), false);
                    return ChainReport {
                        result: Err(RetryError::Skipped {
                            attempts: attempt,
                            error,
                        }),
                        context: ctx,
                    };
                }
                RecoveryAction::AbortBatch => {
                    self.observer
                        .on_halted(&ctx.label, attempt, strategy.name(), true);
                    return ChainReport {
                        result: Err(RetryError::Aborted {
                            attempts: attempt,
                            error,
                        }),
                        context: ctx,
                    };
                }
            }
        }
    }
}
