//! Escalating retry strategy chain
//!
//! One [`RetryChain`] is shared by a batch; each unit of work brings its own
//! [`RetryContext`]. On failure the chain picks the first strategy (by
//! ascending priority) that accepts the error, lets it rewrite the context,
//! and runs the task again.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use extsync_core::retry::{RetryChain, RetryContext};
//! use extsync_core::types::RetryPolicy;
//! use extsync_core::OperationError;
//!
//! async fn example() {
//!     let chain = RetryChain::builder()
//!         .with_standard_strategies(RetryPolicy::default(), None)
//!         .build();
//!     let ctx = RetryContext::new("ms-python.python", Duration::from_secs(60), 5);
//!
//!     let report = chain
//!         .run(ctx, |_ctx| async { Ok::<_, OperationError>("installed") })
//!         .await;
//!     assert_eq!(report.attempts(), 1);
//! }
//! ```

mod context;
mod error;
mod executor;
mod observer;
mod strategies;

pub use context::{InstallPath, RetryContext, RetryMetadata};
pub use error::RetryError;
pub use executor::{ChainReport, RetryChain, RetryChainBuilder};
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{
    calculate_delay, standard_strategies, DirectFallback, DownloadOnlyFallback,
    InterventionDecision, InterventionHandler, NetworkRetry, RecoveryAction, RecoveryStrategy,
    TimeoutIncrease, UserIntervention,
};

#[cfg(test)]
mod tests;
