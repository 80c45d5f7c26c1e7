//! Tests for the retry chain
//!
//! These drive complete units through the chain: strategy selection,
//! context threading between attempts, and the terminal variants.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::failure::{ErrorKind, OperationError};
use crate::retry::{
    InstallPath, InterventionDecision, InterventionHandler, RetryChain, RetryContext, RetryError,
    StatsObserver,
};
use crate::types::{RetryPolicy, RetryStrategy};

/// Network backoff short enough for tests
fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        strategy: RetryStrategy::ExponentialBackoff,
        backoff_multiplier: 2.0,
        initial_delay_ms: 1,
        max_delay_ms: 10,
        jitter: false,
    }
}

fn standard_chain(handler: Option<Arc<dyn InterventionHandler>>) -> RetryChain {
    RetryChain::builder()
        .with_standard_strategies(quick_policy(), handler)
        .build()
}

fn ctx(max_attempts: u32) -> RetryContext {
    RetryContext::new("pub.a", Duration::from_secs(5), max_attempts)
}

/// Answers every prompt with a fixed decision and counts the prompts
struct FixedIntervention {
    decision: InterventionDecision,
    prompts: AtomicU32,
}

impl FixedIntervention {
    fn new(decision: InterventionDecision) -> Arc<Self> {
        Arc::new(Self {
            decision,
            prompts: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl InterventionHandler for FixedIntervention {
    async fn decide(
        &self,
        _label: &str,
        _error: &OperationError,
        _ctx: &RetryContext,
    ) -> InterventionDecision {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

#[tokio::test]
async fn test_immediate_success() {
    let observer = Arc::new(StatsObserver::new());
    let chain = RetryChain::builder()
        .with_standard_strategies(quick_policy(), None)
        .with_observer(observer.clone())
        .build();

    let report = chain
        .run(ctx(5), |_| async { Ok::<_, OperationError>("done") })
        .await;

    assert_eq!(report.result, Ok("done"));
    assert_eq!(report.attempts(), 1);
    assert!(report.last_strategy().is_none());
    assert_eq!(observer.attempt_starts(), 1);
    assert_eq!(observer.successes(), 1);
}

#[tokio::test]
async fn test_network_failures_then_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let chain = standard_chain(None);

    let report = chain
        .run(ctx(5), |_| {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(OperationError::classify("connect ECONNREFUSED 127.0.0.1:443"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert!(report.result.is_ok());
    assert_eq!(report.attempts(), 4);
    assert_eq!(report.last_strategy(), Some("network-retry"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_fatal_error_single_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let observer = Arc::new(StatsObserver::new());
    let chain = RetryChain::builder()
        .with_standard_strategies(quick_policy(), None)
        .with_observer(observer.clone())
        .build();

    let report = chain
        .run(ctx(5), |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(OperationError::classify("404 not found"))
            }
        })
        .await;

    assert_eq!(report.attempts(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let err = report.result.unwrap_err();
    assert!(err.is_non_retryable());
    assert_eq!(err.error().kind, ErrorKind::NotFound);
    assert_eq!(observer.fatals(), 1);
}

#[tokio::test]
async fn test_exhausted_at_max_attempts() {
    let chain = standard_chain(None);

    let report = chain
        .run(ctx(3), |_| async {
            Err::<(), _>(OperationError::network("ETIMEDOUT"))
        })
        .await;

    assert_eq!(report.attempts(), 3);
    assert!(report.result.unwrap_err().is_exhausted());
}

#[tokio::test]
async fn test_network_retry_gives_up_after_five() {
    let chain = standard_chain(None);

    let report = chain
        .run(ctx(10), |_| async {
            Err::<(), _>(OperationError::network("ECONNRESET"))
        })
        .await;

    // network-retry stops accepting at attempt 5 and nothing else matches
    assert_eq!(report.attempts(), 5);
    assert!(matches!(
        report.result,
        Err(RetryError::NoStrategy { attempts: 5, .. })
    ));
}

#[tokio::test]
async fn test_no_strategy_for_other_kind() {
    let chain = standard_chain(None);

    let report = chain
        .run(ctx(5), |_| async {
            Err::<(), _>(OperationError::new(ErrorKind::Other, "weird"))
        })
        .await;

    assert_eq!(report.attempts(), 1);
    assert!(matches!(report.result, Err(RetryError::NoStrategy { .. })));
}

#[tokio::test]
async fn test_deadline_elapsed_doubles_timeout() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let chain = standard_chain(None);
    let ctx = RetryContext::new("pub.slow", Duration::from_millis(20), 5);

    let report = chain
        .run(ctx, |ctx| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(ctx.timeout);
                if ctx.attempt_count == 1 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok::<_, OperationError>(())
            }
        })
        .await;

    assert!(report.result.is_ok());
    assert_eq!(report.attempts(), 2);
    assert_eq!(report.last_strategy(), Some("timeout-increase"));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Duration::from_millis(20), Duration::from_millis(40)]
    );
}

#[tokio::test]
async fn test_install_failure_switches_to_direct() {
    let chain = standard_chain(None);

    let report = chain
        .run(ctx(5), |ctx| async move {
            match ctx.metadata.install_path {
                InstallPath::Standard => Err(OperationError::install("Failed to install")),
                InstallPath::Direct => Ok("direct"),
            }
        })
        .await;

    assert_eq!(report.result, Ok("direct"));
    assert_eq!(report.attempts(), 2);
    assert_eq!(report.context.metadata.install_path, InstallPath::Direct);
    assert_eq!(report.last_strategy(), Some("direct-fallback"));
}

#[tokio::test]
async fn test_install_degrades_to_download_only() {
    let chain = standard_chain(None);
    let mut context = ctx(5);
    context.metadata.supports_download_only = true;
    context.metadata.unattended = true;

    let report = chain
        .run(context, |ctx| async move {
            if ctx.metadata.skip_install {
                Ok("downloaded")
            } else {
                Err(OperationError::install("install failed"))
            }
        })
        .await;

    assert_eq!(report.result, Ok("downloaded"));
    assert_eq!(report.attempts(), 3);
    assert_eq!(
        report.context.metadata.applied_strategies,
        vec!["direct-fallback", "download-only-fallback"]
    );
}

#[tokio::test]
async fn test_user_skip_fails_only_item() {
    let handler = FixedIntervention::new(InterventionDecision::Skip);
    let chain = standard_chain(Some(handler.clone()));

    let report = chain
        .run(ctx(5), |_| async {
            Err::<(), _>(OperationError::install("install failed"))
        })
        .await;

    assert_eq!(report.attempts(), 2);
    assert!(report.result.as_ref().unwrap_err().is_skipped());
    assert!(!report.is_aborted());
    assert_eq!(handler.prompts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_user_abort_is_reported() {
    let handler = FixedIntervention::new(InterventionDecision::Abort);
    let chain = standard_chain(Some(handler.clone()));

    let report = chain
        .run(ctx(5), |_| async {
            Err::<(), _>(OperationError::cli("exit code 1"))
        })
        .await;

    assert!(report.is_aborted());
    assert_eq!(report.attempts(), 2);
}

#[tokio::test]
async fn test_user_retry_continues_until_limit() {
    let handler = FixedIntervention::new(InterventionDecision::Retry);
    let chain = standard_chain(Some(handler.clone()));

    let report = chain
        .run(ctx(4), |_| async {
            Err::<(), _>(OperationError::install("install failed"))
        })
        .await;

    assert_eq!(report.attempts(), 4);
    assert!(report.result.unwrap_err().is_exhausted());
    assert_eq!(handler.prompts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unattended_never_prompts() {
    let handler = FixedIntervention::new(InterventionDecision::Abort);
    let chain = standard_chain(Some(handler.clone()));
    let mut context = ctx(5);
    context.metadata.unattended = true;

    let report = chain
        .run(context, |_| async {
            Err::<(), _>(OperationError::install("install failed"))
        })
        .await;

    assert!(matches!(report.result, Err(RetryError::NoStrategy { .. })));
    assert_eq!(handler.prompts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_last_error_threaded_to_next_attempt() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let chain = standard_chain(None);

    chain
        .run(ctx(3), |ctx| {
            let seen = seen.clone();
            async move {
                seen.lock()
                    .unwrap()
                    .push(ctx.last_error.map(|e| e.message));
                Err::<(), _>(OperationError::network(format!(
                    "ECONNREFUSED #{}",
                    ctx.attempt_count
                )))
            }
        })
        .await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            None,
            Some("ECONNREFUSED #1".to_string()),
            Some("ECONNREFUSED #2".to_string())
        ]
    );
}

#[test]
fn test_strategies_sorted_by_priority() {
    let handler = FixedIntervention::new(InterventionDecision::Skip);
    let chain = RetryChain::builder()
        .with_strategy(Arc::new(crate::retry::UserIntervention::new(handler)))
        .with_strategy(Arc::new(crate::retry::DirectFallback))
        .with_strategy(Arc::new(crate::retry::NetworkRetry::default()))
        .build();

    assert_eq!(
        chain.strategy_names(),
        vec!["network-retry", "direct-fallback", "user-intervention"]
    );
}
