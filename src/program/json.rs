//! Seeds written directly in the serialized representation.

use std::path::Path;

use serde::Deserialize;

use crate::core::{Error, Result};
use crate::model::{Assertion, ClassContext, Statement, TestClass, TestMethod};

use super::SeedReader;

/// Reads `*.json` seed documents.
///
/// ```json
/// {
///   "package": "org.example",
///   "name": "CounterTest",
///   "tests": [
///     { "name": "testIncrement", "statements": [ ... ] }
///   ]
/// }
/// ```
pub struct JsonSeedReader;

#[derive(Deserialize)]
struct SeedDocument {
    #[serde(flatten)]
    context: ClassContext,
    #[serde(default)]
    tests: Vec<SeedTest>,
}

#[derive(Deserialize)]
struct SeedTest {
    name: String,
    statements: Vec<Statement>,
    #[serde(default)]
    assertions: Vec<Assertion>,
}

impl SeedReader for JsonSeedReader {
    fn accepts(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
    }

    fn read(&self, path: &Path, source: &str) -> Result<Option<TestClass>> {
        let doc: SeedDocument =
            serde_json::from_str(source).map_err(|e| Error::parse(path, e.to_string()))?;
        if doc.tests.is_empty() {
            return Ok(None);
        }
        if doc.context.name.is_empty() {
            return Err(Error::parse(path, "missing class name"));
        }

        let tests = doc
            .tests
            .into_iter()
            .map(|t| {
                let seed = doc.context.seed_name(&t.name);
                TestMethod::seed(t.name, seed, t.statements, t.assertions)
            })
            .collect();
        Ok(Some(TestClass::new(doc.context, tests).with_path(path)))
    }
}
