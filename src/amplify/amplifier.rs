//! Amplifier trait and registry.

use std::sync::Arc;

use rand::RngCore;

use crate::config::AmplificationConfig;
use crate::core::{Error, Result};
use crate::model::TestMethod;

use super::amplifiers::{CallAdder, CallRemover, StatementAdder, ValueMutator, ValuePool};

/// Trait for amplification operators.
///
/// An amplifier maps a test method to new candidate test methods. It never
/// edits its input, and returns an empty vector when it finds no applicable
/// mutation point.
pub trait Amplifier: Send + Sync {
    /// Short name used in configuration (e.g. "value", "call-add").
    fn name(&self) -> &'static str;

    /// Human-readable description of what the amplifier does.
    fn description(&self) -> &'static str;

    /// Produce candidates derived from `test`.
    ///
    /// All randomness must come from `rng` so runs are reproducible.
    fn amplify(&self, test: &Arc<TestMethod>, rng: &mut dyn RngCore) -> Vec<TestMethod>;
}

/// Registry of available amplifiers.
pub struct AmplifierRegistry {
    amplifiers: Vec<Box<dyn Amplifier>>,
}

impl Default for AmplifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AmplifierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            amplifiers: Vec::new(),
        }
    }

    /// Registry with the built-in amplifiers configured from `config`.
    pub fn builtin(config: &AmplificationConfig) -> Self {
        let pool = Arc::new(ValuePool::new(&config.values));
        let mut registry = Self::new();
        registry.register(Box::new(ValueMutator::new(Arc::clone(&pool))));
        registry.register(Box::new(CallAdder));
        registry.register(Box::new(CallRemover));
        registry.register(Box::new(StatementAdder::new(
            config.api_surface(),
            pool,
            config.max_insertions,
        )));
        registry
    }

    /// Register an amplifier.
    pub fn register(&mut self, amplifier: Box<dyn Amplifier>) {
        self.amplifiers.push(amplifier);
    }

    /// Get all registered amplifiers.
    pub fn amplifiers(&self) -> &[Box<dyn Amplifier>] {
        &self.amplifiers
    }

    /// Get amplifiers filtered by name, in registration order.
    pub fn get_by_names(&self, names: &[&str]) -> Vec<&dyn Amplifier> {
        self.amplifiers
            .iter()
            .filter(|a| names.contains(&a.name()))
            .map(|a| a.as_ref())
            .collect()
    }

    /// Resolve configured names, failing on any unknown name.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<&dyn Amplifier>> {
        Ok(self
            .resolve_indices(names)?
            .into_iter()
            .map(|i| self.amplifiers[i].as_ref())
            .collect())
    }

    /// Positions of the named amplifiers in registration order, in the
    /// order the names were given.
    pub fn resolve_indices(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.amplifiers
                    .iter()
                    .position(|a| a.name() == name)
                    .ok_or_else(|| {
                        let known: Vec<_> = self.amplifiers.iter().map(|a| a.name()).collect();
                        Error::config(format!(
                            "unknown amplifier '{}' (available: {})",
                            name,
                            known.join(", ")
                        ))
                    })
            })
            .collect()
    }
}
