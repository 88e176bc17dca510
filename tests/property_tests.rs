use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use testamp::amplify::{
    is_required, Amplifier, Candidate, CoverageSignal, ExecutionRequest, ExecutionResult, Generation, Minimizer,
    Sandbox, SandboxPool,
};
use testamp::amplify::amplifiers::{CallRemover, ValueMutator, ValuePool};
use testamp::config::ValuesConfig;
use testamp::core::CancellationToken;
use testamp::model::{Assertion, ClassContext, Expr, Literal, ObservedValue, Statement, StatementId, TestMethod};

/// Coverage is one branch per statement whose call name starts with "hit".
struct HitSandbox;

impl Sandbox for HitSandbox {
    fn execute(&self, request: &ExecutionRequest<'_>) -> ExecutionResult {
        let branches: CoverageSignal = request
            .test
            .statements()
            .iter()
            .filter_map(|s| match s.expression() {
                Some(Expr::Call { method, .. }) if method.starts_with("hit") => Some(method.clone()),
                _ => None,
            })
            .collect();
        ExecutionResult::passed(branches)
    }
}

fn build_test(calls: &[bool]) -> TestMethod {
    let mut statements = vec![Statement::local(1, "Target", "t", Expr::new_object("Target", vec![]))];
    for (i, hit) in calls.iter().enumerate() {
        let method = if *hit { format!("hit{i}") } else { format!("noise{i}") };
        statements.push(Statement::expr(
            i as u32 + 2,
            Expr::call(Some(Expr::var("t")), method, vec![Expr::literal(Literal::Int(i as i64))]),
        ));
    }
    let last = StatementId(statements.len() as u32);
    TestMethod::seed(
        "testTarget",
        "TargetTest#testTarget",
        statements,
        vec![Assertion {
            after: last,
            subject: Expr::call(Some(Expr::var("t")), "size", vec![]),
            expected: ObservedValue::Int(0),
        }],
    )
}

fn signal(branches: &BTreeSet<u8>) -> CoverageSignal {
    branches.iter().map(|b| format!("b{b}")).collect()
}

// ---------------------------------------------------------------------------
// Coverage and generations
// ---------------------------------------------------------------------------

proptest! {
    /// The accepted union of a lineage never shrinks from one generation to the next.
    #[test]
    fn accepted_union_is_monotonic(
        baseline in prop::collection::btree_set(0u8..32, 0..6),
        generations in prop::collection::vec(prop::collection::vec(prop::collection::btree_set(0u8..32, 0..6), 0..4), 1..5),
    ) {
        let seed = Arc::new(build_test(&[]));
        let mut current = Generation::seed(Candidate::seed(Arc::clone(&seed), ExecutionResult::passed(signal(&baseline))));
        for survivors in generations {
            let candidates = survivors
                .iter()
                .map(|b| Candidate::seed(Arc::clone(&seed), ExecutionResult::passed(signal(b))))
                .collect();
            let next = current.next(candidates);
            prop_assert!(current.accepted.is_subset(&next.accepted));
            prop_assert_eq!(next.index, current.index + 1);
            current = next;
        }
    }

    /// Novelty is exactly what the union lacks.
    #[test]
    fn novelty_disjoint_from_accepted(
        accepted in prop::collection::btree_set(0u8..32, 0..10),
        candidate in prop::collection::btree_set(0u8..32, 0..10),
    ) {
        let accepted = signal(&accepted);
        let candidate = signal(&candidate);
        let novelty = candidate.novelty(&accepted);
        prop_assert!(novelty.iter().all(|b| !accepted.contains(b) && candidate.contains(b)));
        prop_assert_eq!(novelty.is_empty(), candidate.is_subset(&accepted));
    }
}

// ---------------------------------------------------------------------------
// Minimizer
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Minimization preserves outcome and coverage, keeps required statements,
    /// and a second pass removes nothing.
    #[test]
    fn minimizer_preserves_result_and_is_idempotent(calls in prop::collection::vec(any::<bool>(), 0..8)) {
        let pool = SandboxPool::new(Arc::new(HitSandbox), 1, CancellationToken::new()).unwrap();
        let context = ClassContext::new("TargetTest");
        let test = build_test(&calls);
        let reference = HitSandbox.execute(&ExecutionRequest::new(&context, &test, testamp::amplify::ExecutionMode::Coverage));

        let once = Minimizer::new().minimize(&pool, &context, test.clone(), &reference);
        let rerun = HitSandbox.execute(&ExecutionRequest::new(&context, &once.test, testamp::amplify::ExecutionMode::Coverage));
        prop_assert_eq!(rerun.outcome, reference.outcome);
        prop_assert_eq!(&rerun.coverage, &reference.coverage);
        prop_assert_eq!(once.test.assertions(), test.assertions());

        for (position, statement) in test.statements().iter().enumerate() {
            if is_required(&test, position) {
                prop_assert!(once.test.statement(statement.id).is_some());
            }
        }

        let twice = Minimizer::new().minimize(&pool, &context, once.test.clone(), &reference);
        prop_assert!(twice.removed.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Amplifiers
// ---------------------------------------------------------------------------

proptest! {
    /// Amplifiers never edit their input and are reproducible for a fixed RNG seed.
    #[test]
    fn amplifiers_are_pure_and_reproducible(calls in prop::collection::vec(any::<bool>(), 1..6), seed in any::<u64>()) {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let parent = Arc::new(build_test(&calls));
        let before = parent.statements().to_vec();
        let amplifiers: Vec<Box<dyn Amplifier>> = vec![
            Box::new(ValueMutator::new(Arc::new(ValuePool::new(&ValuesConfig::default())))),
            Box::new(CallRemover),
        ];
        for amplifier in &amplifiers {
            let first = amplifier.amplify(&parent, &mut StdRng::seed_from_u64(seed));
            let second = amplifier.amplify(&parent, &mut StdRng::seed_from_u64(seed));
            prop_assert_eq!(parent.statements(), before.as_slice());
            prop_assert_eq!(first.len(), second.len());
            for (a, b) in first.iter().zip(&second) {
                prop_assert_eq!(a.statements(), b.statements());
                prop_assert_eq!(a.generation(), parent.generation() + 1);
            }
        }
    }
}
