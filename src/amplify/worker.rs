//! Worker pool for running candidate batches through the sandbox.
//!
//! The pool is the only place where executions run concurrently. Results
//! are returned in submission order regardless of completion order, so
//! everything downstream of a batch is deterministic.

use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::core::progress::ProgressTracker;
use crate::core::{CancellationToken, Error, Result};

use super::sandbox::{ExecutionRequest, ExecutionResult, Outcome, Sandbox};

/// Outcome counts for one batch, updated as executions complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub total: usize,
    pub completed: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub timed_out: usize,
}

impl ProgressUpdate {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn update(&mut self, outcome: Outcome) {
        self.completed += 1;
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Errored => self.errored += 1,
            Outcome::TimedOut => self.timed_out += 1,
        }
    }

    fn message(&self) -> String {
        format!(
            "{} passed, {} failed, {} errored, {} timed out",
            self.passed, self.failed, self.errored, self.timed_out
        )
    }
}

/// Runs batches of executions on a bounded thread pool.
pub struct SandboxPool {
    sandbox: Arc<dyn Sandbox>,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
    show_progress: bool,
}

impl SandboxPool {
    pub fn new(sandbox: Arc<dyn Sandbox>, jobs: usize, cancel: CancellationToken) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(|i| format!("testamp-sandbox-{i}"))
            .build()
            .map_err(|e| Error::config(format!("cannot start sandbox pool: {e}")))?;
        Ok(Self {
            sandbox,
            pool,
            cancel,
            show_progress: false,
        })
    }

    /// Show a progress bar for each batch.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn sandbox(&self) -> &dyn Sandbox {
        self.sandbox.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a single execution on the calling thread.
    ///
    /// Returns `None` when the run was cancelled before it started.
    pub fn execute(&self, request: &ExecutionRequest<'_>) -> Option<ExecutionResult> {
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(self.sandbox.execute(request))
    }

    /// Run a batch of executions.
    ///
    /// Element `i` of the result belongs to `requests[i]`. Requests not
    /// started because of cancellation yield `None`; runs already in flight
    /// finish or time out.
    pub fn run_batch(&self, requests: &[ExecutionRequest<'_>], label: &str) -> Vec<Option<ExecutionResult>> {
        if requests.is_empty() {
            return Vec::new();
        }

        let tracker = ProgressTracker::for_batch(requests.len(), label, "", self.show_progress);
        let progress = Mutex::new(ProgressUpdate::new(requests.len()));

        let results = self.pool.install(|| {
            requests
                .par_iter()
                .map(|request| {
                    let result = self.execute(request)?;
                    let message = {
                        let mut prog = progress.lock();
                        prog.update(result.outcome);
                        prog.message()
                    };
                    tracker.set_message(message);
                    tracker.inc();
                    Some(result)
                })
                .collect::<Vec<_>>()
        });

        tracker.finish_and_clear();
        let summary = progress.into_inner();
        tracing::debug!(
            "{}: {}/{} executions, {}",
            label,
            summary.completed,
            summary.total,
            summary.message()
        );
        results
    }

    /// Apply `f` to every item on the pool, preserving order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }
}
