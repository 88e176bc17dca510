//! Scripted sandbox used by the engine's unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::coverage::CoverageSignal;
use super::sandbox::{ExecutionMode, ExecutionRequest, ExecutionResult, Sandbox};

type Script = dyn Fn(&ExecutionRequest<'_>) -> ExecutionResult + Send + Sync;

/// Sandbox whose results are computed by a closure, counting executions.
pub struct ScriptedSandbox {
    script: Box<Script>,
    executions: AtomicUsize,
    by_mode: [AtomicUsize; 3],
}

impl ScriptedSandbox {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&ExecutionRequest<'_>) -> ExecutionResult + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            executions: AtomicUsize::new(0),
            by_mode: Default::default(),
        }
    }

    pub fn pass_with(branches: &[&str]) -> ExecutionResult {
        ExecutionResult::passed(branches.iter().copied().collect::<CoverageSignal>())
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn executions_in(&self, mode: ExecutionMode) -> usize {
        self.by_mode[mode_index(mode)].load(Ordering::SeqCst)
    }
}

fn mode_index(mode: ExecutionMode) -> usize {
    match mode {
        ExecutionMode::Plain => 0,
        ExecutionMode::Coverage => 1,
        ExecutionMode::Probe => 2,
    }
}

impl Sandbox for ScriptedSandbox {
    fn execute(&self, request: &ExecutionRequest<'_>) -> ExecutionResult {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.by_mode[mode_index(request.mode)].fetch_add(1, Ordering::SeqCst);
        (self.script)(request)
    }
}
