//! Bounded-parallelism task executor
//!
//! `min(P, N)` workers share an atomic cursor over the input; each loops
//! "claim next index, run it, append the outcome" until the cursor runs off
//! the end. Workers are futures polled together on the current task, so a
//! worker waiting on the network, a subprocess or a backoff sleep never
//! holds up the others.
//!
//! A unit may answer [`Flow::AbortBatch`]; from then on no worker claims new
//! work, units already running finish normally, and everything never
//! claimed is listed in [`ExecutionReport::unstarted`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::debug;

/// What the batch should do after a unit finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop accepting new work; in-flight units still complete
    AbortBatch,
}

/// Everything a run produced
#[derive(Debug)]
pub struct ExecutionReport<O> {
    /// `(input index, outcome)` in completion order
    pub outcomes: Vec<(usize, O)>,

    /// A unit asked to abort the batch
    pub aborted: bool,

    /// Input indices that were never claimed, ascending
    pub unstarted: Vec<usize>,

    pub elapsed: Duration,
}

impl<O> ExecutionReport<O> {
    /// Outcomes sorted back into input order
    pub fn into_ordered(mut self) -> Vec<O> {
        self.outcomes.sort_by_key(|(index, _)| *index);
        self.outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Runs independent units with at most `concurrency` in flight
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    concurrency: usize,
    request_delay: Duration,
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TaskExecutor {
    /// A concurrency of 0 is treated as 1
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            request_delay: Duration::ZERO,
        }
    }

    /// Pause each worker for `delay` between consecutive claims
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Drive every item through `unit`
    ///
    /// `unit` receives the input index and a reference to the item. Exactly
    /// one outcome is produced per claimed item; with a concurrency of 1
    /// items run strictly in input order.
    pub async fn run<'a, I, O, F, Fut>(&self, items: &'a [I], unit: F) -> ExecutionReport<O>
    where
        F: Fn(usize, &'a I) -> Fut,
        Fut: Future<Output = (O, Flow)>,
    {
        let started = Instant::now();
        let total = items.len();
        let workers = self.concurrency.min(total);

        let cursor = AtomicUsize::new(0);
        let aborted = AtomicBool::new(false);
        let results: Mutex<Vec<(usize, O)>> = Mutex::new(Vec::with_capacity(total));

        debug!(items = total, workers, "starting task executor");

        let worker_loops = (0..workers).map(|worker| {
            let (cursor, aborted, results, unit) = (&cursor, &aborted, &results, &unit);
            let delay = self.request_delay;

            async move {
                let mut claimed_any = false;
                loop {
                    if claimed_any && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if aborted.load(Ordering::SeqCst) {
                        break;
                    }

                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= total {
                        break;
                    }
                    claimed_any = true;

                    let (outcome, flow) = unit(index, &items[index]).await;
                    results
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push((index, outcome));

                    if flow == Flow::AbortBatch {
                        debug!(worker, index, "unit requested batch abort");
                        aborted.store(true, Ordering::SeqCst);
                    }
                }
            }
        });

        join_all(worker_loops).await;

        let outcomes = results
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let finished: HashSet<usize> = outcomes.iter().map(|(index, _)| *index).collect();
        let unstarted = (0..total).filter(|i| !finished.contains(i)).collect();

        ExecutionReport {
            outcomes,
            aborted: aborted.load(Ordering::SeqCst),
            unstarted,
            elapsed: started.elapsed(),
        }
    }
}
