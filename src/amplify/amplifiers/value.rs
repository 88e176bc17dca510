//! Value mutator: replaces literal arguments with pool values.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::RngCore;

use crate::model::{AmplificationStep, TestMethod};

use super::super::amplifier::Amplifier;
use super::pool::ValuePool;

/// Replaces each literal of each statement, one literal per candidate.
pub struct ValueMutator {
    pool: Arc<ValuePool>,
}

impl ValueMutator {
    pub fn new(pool: Arc<ValuePool>) -> Self {
        Self { pool }
    }
}

impl Amplifier for ValueMutator {
    fn name(&self) -> &'static str {
        "value"
    }

    fn description(&self) -> &'static str {
        "Replace literal values with values from the pool"
    }

    fn amplify(&self, test: &Arc<TestMethod>, rng: &mut dyn RngCore) -> Vec<TestMethod> {
        let mut candidates = Vec::new();
        for statement in test.statements() {
            for index in 0..statement.literal_count() {
                let Some(original) = statement.literal_at(index) else {
                    continue;
                };
                for replacement in self.pool.replacements(original, rng) {
                    let Some(mutated) = statement.with_literal(index, replacement) else {
                        continue;
                    };
                    let step = AmplificationStep {
                        amplifier: self.name().to_string(),
                        touched: BTreeSet::from([statement.id]),
                    };
                    let edited = test.with_statement_replaced(mutated);
                    candidates.push(TestMethod::child(
                        test,
                        &format!("lit{}", candidates.len() + 1),
                        edited.statements().to_vec(),
                        step,
                    ));
                }
            }
        }
        candidates
    }
}
