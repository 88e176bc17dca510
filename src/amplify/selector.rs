//! Fitness selection of candidate batches.
//!
//! A candidate is kept when it passes and either covers branches outside
//! the lineage's accepted union or behaves differently from its parent at
//! a statement the amplifier did not touch. Crashing candidates are never
//! rewarded, whatever they cover.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::{ClassContext, ObservedValue, TestMethod};

use super::candidate::{Candidate, CandidateError};
use super::coverage::CoverageSignal;
use super::sandbox::{ExecutionMode, ExecutionRequest, ExecutionResult};
use super::worker::SandboxPool;

/// A freshly amplified test awaiting selection.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub test: Arc<TestMethod>,
    /// Selection run of the parent the test was derived from.
    pub parent: Arc<ExecutionResult>,
}

/// Why a candidate was not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Discard {
    /// The candidate did not pass.
    Fault(CandidateError),
    /// Passed, but with neither new coverage nor a behavioural difference.
    NotFit,
}

/// Result of selecting one batch.
#[derive(Debug, Default)]
pub struct Selection {
    /// Kept candidates, most novel first.
    pub accepted: Vec<Candidate>,
    /// Discard counts keyed by reason.
    pub discarded: BTreeMap<&'static str, usize>,
    /// Number of sandbox executions spent.
    pub executions: usize,
    /// The batch was interrupted; nothing in it may be used.
    pub cancelled: bool,
}

impl Selection {
    fn discard(&mut self, reason: &'static str) {
        *self.discarded.entry(reason).or_default() += 1;
    }
}

pub struct FitnessSelector {
    population_cap: usize,
}

impl FitnessSelector {
    pub fn new(population_cap: usize) -> Self {
        Self { population_cap }
    }

    /// Run `proposals` under coverage and keep the fit ones.
    ///
    /// `accepted` is the lineage's union as of the previous generation;
    /// every candidate of the batch is judged against the same union.
    pub fn select(
        &self,
        pool: &SandboxPool,
        context: &ClassContext,
        proposals: &[Proposal],
        accepted: &CoverageSignal,
        label: &str,
    ) -> Selection {
        let requests: Vec<_> = proposals
            .iter()
            .map(|p| ExecutionRequest::new(context, &p.test, ExecutionMode::Coverage))
            .collect();
        let results = pool.run_batch(&requests, label);

        let mut selection = Selection {
            executions: results.iter().flatten().count(),
            ..Default::default()
        };
        if results.iter().any(Option::is_none) {
            selection.cancelled = true;
            return selection;
        }

        for (proposal, result) in proposals.iter().zip(results.into_iter().flatten()) {
            match self.judge(proposal, result, accepted) {
                Ok(candidate) => selection.accepted.push(candidate),
                Err(Discard::Fault(err)) => {
                    tracing::debug!("Discarded {}: {}", proposal.test.name(), err);
                    selection.discard(err.key());
                }
                Err(Discard::NotFit) => selection.discard("not_fit"),
            }
        }

        // stable: equal novelty keeps submission order
        selection
            .accepted
            .sort_by(|a, b| b.novelty.len().cmp(&a.novelty.len()));
        if selection.accepted.len() > self.population_cap {
            let over = selection.accepted.len() - self.population_cap;
            selection.accepted.truncate(self.population_cap);
            for _ in 0..over {
                selection.discard("population_cap");
            }
        }
        selection
    }

    fn judge(
        &self,
        proposal: &Proposal,
        result: ExecutionResult,
        accepted: &CoverageSignal,
    ) -> Result<Candidate, Discard> {
        if !result.is_passed() {
            return Err(Discard::Fault(CandidateError::from_result(&result)));
        }
        let novelty = result.coverage.novelty(accepted);
        if novelty.is_empty() && !behaves_differently(&proposal.test, &result, &proposal.parent) {
            return Err(Discard::NotFit);
        }
        Ok(Candidate {
            test: Arc::clone(&proposal.test),
            result,
            baseline: Arc::clone(&proposal.parent),
            novelty,
        })
    }
}

/// Whether `result` observed a different value than `parent` at a
/// statement the amplifier did not touch.
pub fn behaves_differently(test: &TestMethod, result: &ExecutionResult, parent: &ExecutionResult) -> bool {
    let touched = test.step().map(|s| &s.touched);
    result.observations.iter().any(|(id, value)| {
        if touched.is_some_and(|t| t.contains(id)) {
            return false;
        }
        match parent.observations.get(id) {
            Some(ObservedValue::Unobservable) | None => false,
            Some(_) if *value == ObservedValue::Unobservable => false,
            Some(before) => before != value,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amplify::testing::ScriptedSandbox;
    use crate::amplify::Outcome;
    use crate::core::CancellationToken;
    use crate::model::{AmplificationStep, Expr, Literal, Statement, StatementId};
    use std::collections::BTreeSet;

    fn seed() -> Arc<TestMethod> {
        Arc::new(TestMethod::seed(
            "testPush",
            "StackTest#testPush",
            vec![
                Statement::local(1, "Stack", "s", Expr::new_object("Stack", vec![])),
                Statement::expr(
                    2,
                    Expr::call(Some(Expr::var("s")), "push", vec![Expr::literal(Literal::Int(5))]),
                ),
                Statement::local(3, "int", "n", Expr::call(Some(Expr::var("s")), "size", vec![])),
            ],
            vec![],
        ))
    }

    fn child(parent: &Arc<TestMethod>, suffix: &str, value: i64) -> Arc<TestMethod> {
        let edited = parent.with_statement_replaced(
            parent.statements()[1].with_literal(0, Literal::Int(value)).unwrap(),
        );
        Arc::new(TestMethod::child(
            parent,
            suffix,
            edited.statements().to_vec(),
            AmplificationStep {
                amplifier: "value".into(),
                touched: BTreeSet::from([StatementId(2)]),
            },
        ))
    }

    fn pushed_value(test: &TestMethod) -> i64 {
        match test.statements()[1].literal_at(0) {
            Some(Literal::Int(n)) => *n,
            _ => 0,
        }
    }

    fn pool(sandbox: Arc<ScriptedSandbox>) -> SandboxPool {
        SandboxPool::new(sandbox, 2, CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_novel_coverage_accepted() {
        let sandbox = Arc::new(ScriptedSandbox::new(|req| {
            if pushed_value(req.test) == 99 {
                ScriptedSandbox::pass_with(&["a", "b"])
            } else {
                ScriptedSandbox::pass_with(&["a"])
            }
        }));
        let parent = seed();
        let baseline = Arc::new(ScriptedSandbox::pass_with(&["a"]));
        let proposals: Vec<_> = [1, 99]
            .iter()
            .map(|v| Proposal {
                test: child(&parent, &format!("lit{v}"), *v),
                parent: Arc::clone(&baseline),
            })
            .collect();
        let accepted: CoverageSignal = ["a"].into_iter().collect();

        let selection = FitnessSelector::new(10).select(
            &pool(sandbox),
            &ClassContext::new("StackTest"),
            &proposals,
            &accepted,
            "gen 1",
        );
        assert_eq!(selection.accepted.len(), 1);
        assert_eq!(pushed_value(&selection.accepted[0].test), 99);
        assert!(selection.accepted[0].novelty.contains("b"));
        assert_eq!(selection.discarded.get("not_fit"), Some(&1));
        assert_eq!(selection.executions, 2);
    }

    #[test]
    fn test_behavioural_difference_accepted() {
        let parent_result = Arc::new(
            ScriptedSandbox::pass_with(&["a"])
                .with_observation(StatementId(2), ObservedValue::Unobservable)
                .with_observation(StatementId(3), ObservedValue::Int(1)),
        );
        let sandbox = Arc::new(ScriptedSandbox::new(|_| {
            ScriptedSandbox::pass_with(&["a"])
                .with_observation(StatementId(2), ObservedValue::Int(0))
                .with_observation(StatementId(3), ObservedValue::Int(0))
        }));
        let proposals = vec![Proposal {
            test: child(&seed(), "lit1", -1),
            parent: parent_result,
        }];
        let accepted: CoverageSignal = ["a"].into_iter().collect();

        let selection = FitnessSelector::new(10).select(
            &pool(sandbox),
            &ClassContext::new("StackTest"),
            &proposals,
            &accepted,
            "gen 1",
        );
        assert_eq!(selection.accepted.len(), 1);
        assert!(selection.accepted[0].novelty.is_empty());
    }

    #[test]
    fn test_touched_statement_difference_ignored() {
        let parent = ScriptedSandbox::pass_with(&[]).with_observation(StatementId(2), ObservedValue::Int(5));
        let run = ScriptedSandbox::pass_with(&[]).with_observation(StatementId(2), ObservedValue::Int(9));
        let test = child(&seed(), "lit1", 9);
        assert!(!behaves_differently(&test, &run, &parent));
    }

    #[test]
    fn test_crashing_candidate_never_accepted() {
        let sandbox = Arc::new(ScriptedSandbox::new(|req| {
            if pushed_value(req.test) < 0 {
                ExecutionResult::timed_out(std::time::Duration::from_secs(1))
            } else {
                let mut r = ScriptedSandbox::pass_with(&["x", "y", "z"]);
                r.outcome = Outcome::Failed;
                r
            }
        }));
        let parent = seed();
        let baseline = Arc::new(ScriptedSandbox::pass_with(&["a"]));
        let proposals: Vec<_> = [-1, 3]
            .iter()
            .map(|v| Proposal {
                test: child(&parent, &format!("lit{v}"), *v),
                parent: Arc::clone(&baseline),
            })
            .collect();

        let selection = FitnessSelector::new(10).select(
            &pool(sandbox),
            &ClassContext::new("StackTest"),
            &proposals,
            &CoverageSignal::new(),
            "gen 1",
        );
        assert!(selection.accepted.is_empty());
        assert_eq!(selection.discarded.get("timed_out"), Some(&1));
        assert_eq!(selection.discarded.get("failed"), Some(&1));
    }

    #[test]
    fn test_population_cap_prefers_novelty_then_order() {
        let sandbox = Arc::new(ScriptedSandbox::new(|req| match pushed_value(req.test) {
            1 => ScriptedSandbox::pass_with(&["n1"]),
            2 => ScriptedSandbox::pass_with(&["n2"]),
            3 => ScriptedSandbox::pass_with(&["n3", "n4"]),
            _ => ScriptedSandbox::pass_with(&["n5"]),
        }));
        let parent = seed();
        let baseline = Arc::new(ScriptedSandbox::pass_with(&[]));
        let proposals: Vec<_> = [1, 2, 3, 4]
            .iter()
            .map(|v| Proposal {
                test: child(&parent, &format!("lit{v}"), *v),
                parent: Arc::clone(&baseline),
            })
            .collect();

        let selection = FitnessSelector::new(2).select(
            &pool(sandbox),
            &ClassContext::new("StackTest"),
            &proposals,
            &CoverageSignal::new(),
            "gen 1",
        );
        let kept: Vec<_> = selection.accepted.iter().map(|c| pushed_value(&c.test)).collect();
        assert_eq!(kept, vec![3, 1]);
        assert_eq!(selection.discarded.get("population_cap"), Some(&2));
    }

    #[test]
    fn test_cancelled_batch() {
        let sandbox = Arc::new(ScriptedSandbox::new(|_| ScriptedSandbox::pass_with(&["b"])));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = SandboxPool::new(sandbox, 1, cancel).unwrap();
        let proposals = vec![Proposal {
            test: child(&seed(), "lit1", 1),
            parent: Arc::new(ScriptedSandbox::pass_with(&[])),
        }];
        let selection = FitnessSelector::new(10).select(
            &pool,
            &ClassContext::new("StackTest"),
            &proposals,
            &CoverageSignal::new(),
            "gen 1",
        );
        assert!(selection.cancelled);
        assert!(selection.accepted.is_empty());
    }
}
