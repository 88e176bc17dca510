//! Greedy fitness-preserving minimization.
//!
//! Statements are removed one at a time, last to first. A removal is kept
//! only if a coverage re-run reproduces the reference outcome and coverage
//! signal exactly. Assertions are never edited; statements they depend on
//! are never candidates for removal.

use std::collections::BTreeSet;

use crate::model::{ClassContext, StatementId, TestMethod};

use super::sandbox::{ExecutionMode, ExecutionRequest, ExecutionResult};
use super::worker::SandboxPool;

/// Why minimization ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizeStop {
    /// A full pass removed nothing.
    Stall,
    /// The run was cancelled; the test is valid but maybe not minimal.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Minimized {
    pub test: TestMethod,
    pub removed: Vec<StatementId>,
    pub executions: usize,
    pub stop: MinimizeStop,
}

#[derive(Debug, Default)]
pub struct Minimizer;

impl Minimizer {
    pub fn new() -> Self {
        Self
    }

    /// Minimize `test`, whose coverage run is `reference`.
    pub fn minimize(
        &self,
        pool: &SandboxPool,
        context: &ClassContext,
        test: TestMethod,
        reference: &ExecutionResult,
    ) -> Minimized {
        let mut current = test;
        let mut removed = Vec::new();
        let mut executions = 0;

        loop {
            let mut progressed = false;
            let mut position = current.statements().len();
            while position > 0 {
                position -= 1;
                if position >= current.statements().len() || is_required(&current, position) {
                    continue;
                }
                let id = current.statements()[position].id;
                let trial = current.without_statement(id);
                let Some(run) = pool.execute(&ExecutionRequest::new(context, &trial, ExecutionMode::Coverage)) else {
                    return Minimized {
                        test: current,
                        removed,
                        executions,
                        stop: MinimizeStop::Cancelled,
                    };
                };
                executions += 1;
                if run.outcome == reference.outcome && run.coverage == reference.coverage {
                    tracing::trace!("Removed {} from {}", id, current.name());
                    current = trial;
                    removed.push(id);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        Minimized {
            test: current,
            removed,
            executions,
            stop: MinimizeStop::Stall,
        }
    }
}

/// A statement must stay if it anchors an assertion, declares a variable
/// read later, or is opaque.
pub fn is_required(test: &TestMethod, position: usize) -> bool {
    let Some(statement) = test.statements().get(position) else {
        return true;
    };
    if statement.is_opaque() {
        return true;
    }
    let anchors: BTreeSet<StatementId> = test.assertions().iter().map(|a| a.after).collect();
    if anchors.contains(&statement.id) {
        return true;
    }
    match statement.declared_var() {
        Some(var) => test.vars_used_after(position).contains(var),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amplify::testing::ScriptedSandbox;
    use crate::amplify::CoverageSignal;
    use crate::core::CancellationToken;
    use crate::model::{Assertion, Expr, ObservedValue, Statement, StatementKind};
    use std::sync::Arc;

    fn call(id: u32, method: &str) -> Statement {
        Statement::expr(id, Expr::call(Some(Expr::var("c")), method, vec![]))
    }

    /// Five statements; 2 and 4 do nothing observable.
    fn five_statement_test() -> TestMethod {
        TestMethod::seed(
            "testCount",
            "CounterTest#testCount",
            vec![
                Statement::local(1, "Counter", "c", Expr::new_object("Counter", vec![])),
                call(2, "noise"),
                call(3, "increment"),
                call(4, "noise"),
                call(5, "increment"),
            ],
            vec![Assertion {
                after: StatementId(5),
                subject: Expr::call(Some(Expr::var("c")), "get", vec![]),
                expected: ObservedValue::Int(2),
            }],
        )
    }

    /// Coverage: one branch per `increment` call, keyed by its id.
    fn coverage_of(test: &TestMethod) -> ExecutionResult {
        let branches: CoverageSignal = test
            .statements()
            .iter()
            .filter(|s| match &s.kind {
                StatementKind::Expr { expr: Expr::Call { method, .. } } => method == "increment",
                _ => false,
            })
            .map(|s| format!("inc@{}", s.id))
            .collect();
        ExecutionResult::passed(branches)
    }

    fn sandbox() -> Arc<ScriptedSandbox> {
        Arc::new(ScriptedSandbox::new(|req| coverage_of(req.test)))
    }

    fn pool(sandbox: Arc<ScriptedSandbox>) -> SandboxPool {
        SandboxPool::new(sandbox, 1, CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_removes_statements_without_effect() {
        let test = five_statement_test();
        let reference = coverage_of(&test);
        let result = Minimizer::new().minimize(&pool(sandbox()), &ClassContext::new("CounterTest"), test, &reference);

        let ids: Vec<_> = result.test.statements().iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert_eq!(result.removed, vec![StatementId(4), StatementId(2)]);
        assert_eq!(result.stop, MinimizeStop::Stall);
        // outcome and coverage unchanged
        assert_eq!(coverage_of(&result.test), reference);
        assert_eq!(result.test.assertions().len(), 1);
    }

    #[test]
    fn test_minimizer_is_idempotent() {
        let sandbox = sandbox();
        let pool = pool(sandbox.clone());
        let ctx = ClassContext::new("CounterTest");
        let test = five_statement_test();
        let reference = coverage_of(&test);

        let once = Minimizer::new().minimize(&pool, &ctx, test, &reference);
        let twice = Minimizer::new().minimize(&pool, &ctx, once.test.clone(), &reference);
        assert!(twice.removed.is_empty());
        assert_eq!(twice.test.statements(), once.test.statements());
    }

    #[test]
    fn test_required_statements() {
        let test = five_statement_test();
        // declares `c`, used later
        assert!(is_required(&test, 0));
        assert!(!is_required(&test, 1));
        // anchors the assertion
        assert!(is_required(&test, 4));

        let opaque = TestMethod::seed("t", "C#t", vec![Statement::opaque(1, "x++;")], vec![]);
        assert!(is_required(&opaque, 0));
    }

    #[test]
    fn test_cancelled_minimization_keeps_valid_test() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = SandboxPool::new(sandbox(), 1, cancel).unwrap();
        let test = five_statement_test();
        let reference = coverage_of(&test);
        let result = Minimizer::new().minimize(&pool, &ClassContext::new("CounterTest"), test, &reference);
        assert_eq!(result.stop, MinimizeStop::Cancelled);
        assert_eq!(result.test.statements().len(), 5);
    }
}
