//! Statement adder: inserts calls against a configured API surface.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::seq::index;
use rand::RngCore;

use crate::config::ApiMethod;
use crate::model::{AmplificationStep, Expr, Statement, TestMethod};

use super::super::amplifier::Amplifier;
use super::pool::{same_type, ValuePool};

/// An applicable insertion: call `method` after `position` statements.
struct Insertion<'a> {
    position: usize,
    method: &'a ApiMethod,
    receiver: Option<String>,
}

/// Inserts up to `max_insertions` API calls per test, one per candidate.
pub struct StatementAdder {
    api: Vec<ApiMethod>,
    pool: Arc<ValuePool>,
    max_insertions: usize,
}

impl StatementAdder {
    pub fn new(api: Vec<ApiMethod>, pool: Arc<ValuePool>, max_insertions: usize) -> Self {
        Self {
            api,
            pool,
            max_insertions,
        }
    }

    fn insertions<'a>(&'a self, test: &TestMethod) -> Vec<Insertion<'a>> {
        let mut out = Vec::new();
        for position in 0..=test.statements().len() {
            let locals = test.locals_before(position);
            for method in &self.api {
                if method.is_static {
                    out.push(Insertion {
                        position,
                        method,
                        receiver: None,
                    });
                    continue;
                }
                for (name, ty) in &locals {
                    if same_type(ty, &method.class) {
                        out.push(Insertion {
                            position,
                            method,
                            receiver: Some((*name).to_string()),
                        });
                    }
                }
            }
        }
        out
    }
}

impl Amplifier for StatementAdder {
    fn name(&self) -> &'static str {
        "statement-add"
    }

    fn description(&self) -> &'static str {
        "Insert calls to methods of the configured API surface"
    }

    fn amplify(&self, test: &Arc<TestMethod>, rng: &mut dyn RngCore) -> Vec<TestMethod> {
        if self.api.is_empty() || self.max_insertions == 0 {
            return Vec::new();
        }
        let insertions = self.insertions(test);
        if insertions.is_empty() {
            return Vec::new();
        }

        let amount = self.max_insertions.min(insertions.len());
        let mut chosen = index::sample(rng, insertions.len(), amount).into_vec();
        chosen.sort_unstable();

        let id = test.fresh_id();
        chosen
            .into_iter()
            .enumerate()
            .map(|(n, i)| {
                let insertion = &insertions[i];
                let locals = test.locals_before(insertion.position);
                let args = insertion
                    .method
                    .params
                    .iter()
                    .map(|ty| self.pool.argument_for(ty, &locals, rng))
                    .collect();
                let receiver = match &insertion.receiver {
                    Some(var) => Expr::var(var.as_str()),
                    None => Expr::opaque(insertion.method.class.as_str()),
                };
                let call = Expr::call(Some(receiver), insertion.method.method.as_str(), args);
                let statement = match insertion.method.returns.as_deref() {
                    Some(ty) if ty != "void" => {
                        Statement::local(id.0, ty, format!("o_sa{}", id.0), call)
                    }
                    _ => Statement::expr(id.0, call),
                };
                let edited = test.with_statement_inserted(insertion.position, statement);
                TestMethod::child(
                    test,
                    &format!("sa{}", n + 1),
                    edited.statements().to_vec(),
                    AmplificationStep {
                        amplifier: self.name().to_string(),
                        touched: BTreeSet::from([id]),
                    },
                )
            })
            .collect()
    }
}
