//! Bounded worker pool for per-package work
//!
//! Items run on tokio tasks, at most `concurrency` at a time. An item starts
//! only after all of its predecessors completed successfully; among ready
//! items the input order decides. After the first failure, or once the
//! [`CancelSignal`] is set, no new item starts: in-flight items finish and
//! the rest are reported as skipped.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gantry_core::{GantryError, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one pool run
#[derive(Debug)]
pub struct PoolReport<T> {
    /// Items that succeeded, in completion order
    pub completed: Vec<(String, T)>,
    /// Items that failed, in completion order
    pub failures: Vec<(String, GantryError)>,
    /// Items that never started
    pub skipped: Vec<String>,
    /// Whether the run was cut short by the cancel signal
    pub cancelled: bool,
}

impl<T> PoolReport<T> {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            cancelled: false,
        }
    }

    /// Whether every item succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty() && !self.cancelled
    }

    /// Names of the items that succeeded
    pub fn completed_names(&self) -> Vec<String> {
        self.completed.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Runs per-package jobs with bounded concurrency and predecessor gating
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    cancel: CancelSignal,
}

impl WorkerPool {
    /// Create a pool; a concurrency of zero is treated as one
    pub fn new(concurrency: usize, cancel: CancelSignal) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Maximum items in flight
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `job` for every item.
    ///
    /// `predecessors` maps an item to the items that must succeed first;
    /// items missing from the map have none.
    pub async fn run<T, F, Fut>(
        &self,
        items: &[String],
        predecessors: &BTreeMap<String, Vec<String>>,
        job: F,
    ) -> PoolReport<T>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut queued: Vec<String> = items.to_vec();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut tasks: JoinSet<(String, Result<T>)> = JoinSet::new();
        let mut report = PoolReport::new();
        let mut stopped = false;

        loop {
            let mut index = 0;
            while !stopped && index < queued.len() {
                if self.cancel.is_cancelled() {
                    debug!(queued = queued.len(), "cancelled, not starting queued items");
                    report.cancelled = true;
                    stopped = true;
                    break;
                }

                let ready = predecessors
                    .get(&queued[index])
                    .map_or(true, |preds| preds.iter().all(|p| succeeded.contains(p)));
                if !ready {
                    index += 1;
                    continue;
                }
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };

                let name = queued.remove(index);
                debug!(item = %name, "starting");
                let work = job(name.clone());
                tasks.spawn(async move {
                    let result = work.await;
                    drop(permit);
                    (name, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((name, Ok(value))) => {
                    debug!(item = %name, "completed");
                    succeeded.insert(name.clone());
                    report.completed.push((name, value));
                }
                Ok((name, Err(e))) => {
                    warn!(item = %name, error = %e, "failed, not starting queued items");
                    report.failures.push((name, e));
                    stopped = true;
                }
                Err(e) => {
                    warn!(error = %e, "worker task panicked");
                    let error = GantryError::other(format!("worker task panicked: {}", e));
                    report.failures.push(("<unknown>".to_string(), error));
                    stopped = true;
                }
            }
        }

        report.skipped = queued;
        report
    }
}
