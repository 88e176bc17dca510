//! Assertion synthesis.
//!
//! A retained candidate is re-run in probe mode to capture the values bound
//! by invocations and the state of every receiver. Values that are stable
//! across probe runs become assertions; the synthesized test must then pass
//! on immediate re-execution.

use std::collections::BTreeMap;

use crate::model::{Assertion, ClassContext, Expr, ObservedValue, ProbePoint, ProbeTarget, StatementKind, TestMethod};

use super::candidate::{Candidate, CandidateError};
use super::sandbox::{ExecutionMode, ExecutionRequest, ExecutionResult};
use super::worker::SandboxPool;

/// A candidate with its synthesized assertions.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub test: TestMethod,
    /// Coverage run of the synthesized test.
    pub result: ExecutionResult,
    pub executions: usize,
}

pub struct AssertionSynthesizer {
    probe_runs: usize,
}

impl AssertionSynthesizer {
    pub fn new(probe_runs: usize) -> Self {
        Self {
            probe_runs: probe_runs.max(1),
        }
    }

    pub fn synthesize(
        &self,
        pool: &SandboxPool,
        context: &ClassContext,
        candidate: &Candidate,
    ) -> Result<Synthesized, SynthesisFailure> {
        let mut executions = 0;
        let test = candidate.test.without_assertions();
        let probes = probe_points(&test);
        if probes.is_empty() {
            return Err(SynthesisFailure::Rejected(CandidateError::NoProbes));
        }

        let request = ExecutionRequest::new(context, &test, ExecutionMode::Probe).with_probes(&probes);
        let mut runs = Vec::with_capacity(self.probe_runs);
        for _ in 0..self.probe_runs {
            let run = pool.execute(&request).ok_or(SynthesisFailure::Cancelled)?;
            executions += 1;
            if run.outcome != candidate.result.outcome || run.coverage != candidate.result.coverage {
                return Err(SynthesisFailure::Rejected(CandidateError::SynthesisNonDeterminism));
            }
            runs.push(run);
        }

        let assertions = assertions_from(&probes, &runs);
        if assertions.is_empty() {
            return Err(SynthesisFailure::Rejected(CandidateError::UnstableAssertions));
        }

        let synthesized = test.with_assertions(assertions);
        let check = pool
            .execute(&ExecutionRequest::new(context, &synthesized, ExecutionMode::Coverage))
            .ok_or(SynthesisFailure::Cancelled)?;
        executions += 1;
        if !check.is_passed() {
            tracing::debug!(
                "Assertions of {} fail on re-execution: {}",
                synthesized.name(),
                check.outcome
            );
            return Err(SynthesisFailure::Rejected(CandidateError::UnstableAssertions));
        }

        Ok(Synthesized {
            test: synthesized,
            result: check,
            executions,
        })
    }
}

/// Why synthesis produced no test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisFailure {
    Rejected(CandidateError),
    Cancelled,
}

/// Probe points of a test: values bound by invocations, and receiver
/// state after every invocation on a local.
pub fn probe_points(test: &TestMethod) -> Vec<ProbePoint> {
    let mut probes = Vec::new();
    for statement in test.statements() {
        if let StatementKind::Local { name, init, .. } = &statement.kind {
            if init.is_invocation() {
                probes.push(ProbePoint {
                    id: format!("{}:value:{}", statement.id, name),
                    after: statement.id,
                    target: ProbeTarget::Value(name.clone()),
                });
            }
        }
        if let Some(receiver) = statement.receiver_var() {
            probes.push(ProbePoint {
                id: format!("{}:receiver:{}", statement.id, receiver),
                after: statement.id,
                target: ProbeTarget::Receiver(receiver.to_string()),
            });
        }
    }
    probes
}

/// Assertions for every probe whose value is identical across `runs`.
fn assertions_from(probes: &[ProbePoint], runs: &[ExecutionResult]) -> Vec<Assertion> {
    let mut assertions = Vec::new();
    for probe in probes {
        let Some(value) = stable_value(&probe.id, runs) else {
            continue;
        };
        let var = Expr::var(probe.target.var());
        match value {
            ObservedValue::Object { fields, .. } => {
                assertions.extend(object_assertions(probe, &var, fields));
            }
            scalar if scalar.is_assertable() => assertions.push(Assertion {
                after: probe.after,
                subject: var,
                expected: scalar.clone(),
            }),
            _ => {}
        }
    }
    assertions
}

fn stable_value<'a>(id: &str, runs: &'a [ExecutionResult]) -> Option<&'a ObservedValue> {
    let first = runs.first()?.probes.get(id)?;
    runs.iter()
        .all(|run| run.probes.get(id) == Some(first))
        .then_some(first)
}

/// One assertion per observable getter of an object value.
fn object_assertions(probe: &ProbePoint, var: &Expr, fields: &BTreeMap<String, ObservedValue>) -> Vec<Assertion> {
    fields
        .iter()
        .filter(|(_, value)| value.is_assertable() && !matches!(value, ObservedValue::Object { .. }))
        .map(|(getter, value)| Assertion {
            after: probe.after,
            subject: Expr::call(Some(var.clone()), getter.as_str(), vec![]),
            expected: value.clone(),
        })
        .collect()
}
