//! Call remover: deletes invocation statements whose result is unused.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::RngCore;

use crate::model::{AmplificationStep, Statement, StatementKind, TestMethod};

use super::super::amplifier::Amplifier;

pub struct CallRemover;

impl CallRemover {
    fn removable(test: &TestMethod, position: usize, statement: &Statement) -> bool {
        match &statement.kind {
            StatementKind::Expr { expr } => expr.is_invocation(),
            StatementKind::Local { name, init, .. } => {
                init.is_invocation() && !test.vars_used_after(position).contains(name)
            }
            StatementKind::Opaque { .. } => false,
        }
    }
}

impl Amplifier for CallRemover {
    fn name(&self) -> &'static str {
        "call-remove"
    }

    fn description(&self) -> &'static str {
        "Remove method invocations whose result is not used"
    }

    fn amplify(&self, test: &Arc<TestMethod>, _rng: &mut dyn RngCore) -> Vec<TestMethod> {
        if test.statements().len() < 2 {
            return Vec::new();
        }
        test.statements()
            .iter()
            .enumerate()
            .filter(|(position, s)| Self::removable(test, *position, s))
            .enumerate()
            .map(|(n, (_, s))| {
                let edited = test.without_statement(s.id);
                TestMethod::child(
                    test,
                    &format!("rem{}", n + 1),
                    edited.statements().to_vec(),
                    AmplificationStep {
                        amplifier: self.name().to_string(),
                        touched: BTreeSet::from([s.id]),
                    },
                )
            })
            .collect()
    }
}
