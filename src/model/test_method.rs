//! Immutable test methods and their lineage.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::statement::{Expr, Statement, StatementId};
use super::value::ObservedValue;

/// Record of the amplifier application that produced a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplificationStep {
    /// Name of the amplifier.
    pub amplifier: String,
    /// Statements the amplifier inserted, removed or rewrote.
    pub touched: BTreeSet<StatementId>,
}

/// What a probe point observes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "var", rename_all = "snake_case")]
pub enum ProbeTarget {
    /// The value bound to a local variable.
    Value(String),
    /// The state of a receiver object, read through its getters.
    Receiver(String),
}

impl ProbeTarget {
    pub fn var(&self) -> &str {
        match self {
            Self::Value(var) | Self::Receiver(var) => var,
        }
    }
}

/// A location where the runner captures a runtime value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePoint {
    /// Identifier echoed back by the runner.
    pub id: String,
    /// The value is captured right after this statement executes.
    pub after: StatementId,
    pub target: ProbeTarget,
}

/// A synthesized assertion: `subject` must equal `expected` after `after`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub after: StatementId,
    pub subject: Expr,
    pub expected: ObservedValue,
}

impl Assertion {
    /// Variables the assertion reads.
    pub fn referenced_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.subject.referenced_vars(&mut out);
        out
    }
}

/// A test method: ordered statements, assertions and lineage metadata.
///
/// Test methods are immutable. Every edit returns a new value; children
/// produced by amplifiers point back at their parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMethod {
    name: String,
    seed: String,
    generation: u32,
    statements: Vec<Statement>,
    #[serde(default)]
    assertions: Vec<Assertion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step: Option<AmplificationStep>,
    #[serde(skip)]
    parent: Option<Arc<TestMethod>>,
}

impl TestMethod {
    /// Create a generation-0 seed test.
    pub fn seed(
        name: impl Into<String>,
        seed: impl Into<String>,
        statements: Vec<Statement>,
        assertions: Vec<Assertion>,
    ) -> Self {
        Self {
            name: name.into(),
            seed: seed.into(),
            generation: 0,
            statements,
            assertions,
            step: None,
            parent: None,
        }
    }

    /// Create a child of `parent` one generation later.
    ///
    /// Children never inherit assertions: amplified statements invalidate
    /// whatever the parent asserted.
    pub fn child(
        parent: &Arc<TestMethod>,
        suffix: &str,
        statements: Vec<Statement>,
        step: AmplificationStep,
    ) -> Self {
        Self {
            name: format!("{}_{}", parent.name, suffix),
            seed: parent.seed.clone(),
            generation: parent.generation + 1,
            statements,
            assertions: Vec::new(),
            step: Some(step),
            parent: Some(Arc::clone(parent)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified name of the seed this test descends from.
    pub fn seed_name(&self) -> &str {
        &self.seed
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    pub fn step(&self) -> Option<&AmplificationStep> {
        self.step.as_ref()
    }

    pub fn parent(&self) -> Option<&Arc<TestMethod>> {
        self.parent.as_ref()
    }

    pub fn is_seed(&self) -> bool {
        self.parent.is_none() && self.generation == 0
    }

    /// This test followed by its ancestors, ending at the seed.
    pub fn lineage(&self) -> impl Iterator<Item = &TestMethod> {
        std::iter::successors(Some(self), |t| t.parent.as_deref())
    }

    /// The root of the lineage.
    pub fn root(&self) -> &TestMethod {
        self.lineage().last().unwrap_or(self)
    }

    /// The next unused statement id.
    pub fn fresh_id(&self) -> StatementId {
        let max = self.statements.iter().map(|s| s.id.0).max().unwrap_or(0);
        StatementId(max + 1)
    }

    pub fn position_of(&self, id: StatementId) -> Option<usize> {
        self.statements.iter().position(|s| s.id == id)
    }

    pub fn statement(&self, id: StatementId) -> Option<&Statement> {
        self.statements.iter().find(|s| s.id == id)
    }

    /// Copy with the given assertions replacing the current ones.
    pub fn with_assertions(&self, assertions: Vec<Assertion>) -> Self {
        Self {
            assertions,
            ..self.clone()
        }
    }

    /// Copy without any assertions.
    pub fn without_assertions(&self) -> Self {
        self.with_assertions(Vec::new())
    }

    /// Copy with the statement `id` removed. Assertions are kept as-is.
    pub fn without_statement(&self, id: StatementId) -> Self {
        Self {
            statements: self
                .statements
                .iter()
                .filter(|s| s.id != id)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    /// Copy with `statement` inserted at `position` (clamped to the end).
    pub fn with_statement_inserted(&self, position: usize, statement: Statement) -> Self {
        let mut statements = self.statements.clone();
        statements.insert(position.min(statements.len()), statement);
        Self {
            statements,
            ..self.clone()
        }
    }

    /// Copy with the statement carrying `statement.id` replaced.
    pub fn with_statement_replaced(&self, statement: Statement) -> Self {
        Self {
            statements: self
                .statements
                .iter()
                .map(|s| if s.id == statement.id { statement.clone() } else { s.clone() })
                .collect(),
            ..self.clone()
        }
    }

    /// Copy under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Variables read by statements after `position` or by any assertion.
    pub fn vars_used_after(&self, position: usize) -> BTreeSet<String> {
        let mut used: BTreeSet<String> = self
            .statements
            .iter()
            .skip(position + 1)
            .flat_map(|s| s.referenced_vars())
            .collect();
        for assertion in &self.assertions {
            used.extend(assertion.referenced_vars());
        }
        used
    }

    /// Local variables declared before `position`, with their types.
    pub fn locals_before(&self, position: usize) -> Vec<(&str, &str)> {
        self.statements
            .iter()
            .take(position)
            .filter_map(Statement::declared)
            .collect()
    }
}
