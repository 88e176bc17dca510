//! Call adder: repeats invocations on existing receivers.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::RngCore;

use crate::model::{AmplificationStep, Statement, TestMethod};

use super::super::amplifier::Amplifier;

/// Duplicates each invocation on a local receiver right after itself.
pub struct CallAdder;

impl Amplifier for CallAdder {
    fn name(&self) -> &'static str {
        "call-add"
    }

    fn description(&self) -> &'static str {
        "Duplicate method invocations on existing receivers"
    }

    fn amplify(&self, test: &Arc<TestMethod>, _rng: &mut dyn RngCore) -> Vec<TestMethod> {
        let fresh = test.fresh_id();
        test.statements()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.receiver_var().is_some())
            .filter_map(|(position, s)| Some((position, s.expression()?.clone())))
            .enumerate()
            .map(|(n, (position, call))| {
                let duplicate = Statement::expr(fresh.0, call);
                let edited = test.with_statement_inserted(position + 1, duplicate);
                TestMethod::child(
                    test,
                    &format!("add{}", n + 1),
                    edited.statements().to_vec(),
                    AmplificationStep {
                        amplifier: self.name().to_string(),
                        touched: BTreeSet::from([fresh]),
                    },
                )
            })
            .collect()
    }
}
