//! Test classes: the context seed tests are compiled in.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::test_method::TestMethod;

/// Everything of a test class except its test methods.
///
/// Amplified tests are rendered into a class with the same package, imports
/// and members (fields, setup methods) as the class they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub name: String,
    #[serde(default)]
    pub imports: Vec<String>,
    /// Non-test members, kept verbatim.
    #[serde(default)]
    pub members: Vec<String>,
}

impl ClassContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Fully qualified class name.
    pub fn qualified_name(&self) -> String {
        match &self.package {
            Some(pkg) if !pkg.is_empty() => format!("{}.{}", pkg, self.name),
            _ => self.name.clone(),
        }
    }

    /// Qualified seed name for one of this class's test methods.
    pub fn seed_name(&self, method: &str) -> String {
        format!("{}#{}", self.qualified_name(), method)
    }
}

/// A test class with its seed tests.
#[derive(Debug, Clone)]
pub struct TestClass {
    pub context: Arc<ClassContext>,
    pub tests: Vec<TestMethod>,
    /// File the class was read from.
    pub path: Option<PathBuf>,
}

impl TestClass {
    pub fn new(context: ClassContext, tests: Vec<TestMethod>) -> Self {
        Self {
            context: Arc::new(context),
            tests,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }
}
