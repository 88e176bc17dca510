//! Conversion between test source files and the editable representation.
//!
//! Readers turn seed test classes into [`TestClass`] values, printers turn
//! amplified [`TestMethod`]s back into source. The engine itself only sees
//! the representation in [`crate::model`].

mod java;
mod json;
mod printer;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::core::{Error, Result};
use crate::model::{ClassContext, TestClass, TestMethod};

pub use java::JavaSeedReader;
pub use json::JsonSeedReader;
pub use printer::{print_assertion, print_expr, print_statement, JavaPrinter, DOUBLE_DELTA};

/// Reads seed test classes from source files.
pub trait SeedReader: Send + Sync {
    /// Whether this reader handles the given file.
    fn accepts(&self, path: &Path) -> bool;

    /// Read a test class. Returns `None` when the file holds no tests.
    fn read(&self, path: &Path, source: &str) -> Result<Option<TestClass>>;
}

/// Renders test methods as source text.
pub trait SourcePrinter: Send + Sync {
    /// Extension of generated files, without the dot.
    fn file_extension(&self) -> &'static str;

    /// Render a complete class holding `tests`.
    fn print_class(&self, context: &ClassContext, class_name: &str, tests: &[TestMethod]) -> String;

    /// Render a single test method.
    fn print_method(&self, test: &TestMethod) -> String;
}

/// Finds and reads seed test classes below a directory.
pub struct SeedLoader {
    readers: Vec<Box<dyn SeedReader>>,
    class_filter: Option<String>,
}

impl SeedLoader {
    /// Loader with the Java and JSON readers.
    pub fn new() -> Result<Self> {
        Ok(Self {
            readers: vec![Box::new(JavaSeedReader::new()?), Box::new(JsonSeedReader)],
            class_filter: None,
        })
    }

    /// Loader with a custom set of readers.
    pub fn with_readers(readers: Vec<Box<dyn SeedReader>>) -> Self {
        Self {
            readers,
            class_filter: None,
        }
    }

    /// Keep only classes whose simple or qualified name contains `filter`.
    pub fn with_class_filter(mut self, filter: Option<String>) -> Self {
        self.class_filter = filter.filter(|f| !f.is_empty());
        self
    }

    /// Discover seed files under `dir`, sorted by path.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Err(Error::FileNotFound {
                path: dir.to_path_buf(),
            });
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_seed_file(path) && self.readers.iter().any(|r| r.accepts(path)))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Read every seed class under `dir`.
    pub fn load(&self, dir: &Path) -> Result<Vec<TestClass>> {
        let mut classes = Vec::new();
        for path in self.discover(dir)? {
            let Some(reader) = self.readers.iter().find(|r| r.accepts(&path)) else {
                continue;
            };
            let source = std::fs::read_to_string(&path)?;
            let Some(class) = reader.read(&path, &source)? else {
                tracing::debug!("No tests in {}", path.display());
                continue;
            };
            if self.matches_filter(&class) && !class.tests.is_empty() {
                classes.push(class);
            }
        }
        tracing::info!(
            "Loaded {} seed classes ({} tests) from {}",
            classes.len(),
            classes.iter().map(|c| c.tests.len()).sum::<usize>(),
            dir.display()
        );
        Ok(classes)
    }

    fn matches_filter(&self, class: &TestClass) -> bool {
        match &self.class_filter {
            Some(filter) => class.context.qualified_name().contains(filter.as_str()),
            None => true,
        }
    }
}

fn is_seed_file(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some("java") => stem.contains("Test") && !stem.ends_with("Ampl"),
        Some("json") => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const JAVA_SEED: &str = r#"
package org.example;

import org.junit.Test;

public class CounterTest {
    @Test
    public void testIncrement() {
        Counter c = new Counter();
        c.increment(1);
    }
}
"#;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_is_seed_file() {
        assert!(is_seed_file(Path::new("src/FooTest.java")));
        assert!(is_seed_file(Path::new("TestFoo.java")));
        assert!(!is_seed_file(Path::new("Foo.java")));
        assert!(!is_seed_file(Path::new("FooTestAmpl.java")));
        assert!(is_seed_file(Path::new("seeds.json")));
        assert!(!is_seed_file(Path::new("README.md")));
    }

    #[test]
    fn test_discover_sorted() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "org/example/CounterTest.java", JAVA_SEED);
        write(temp.path(), "org/example/Counter.java", "class Counter {}");
        write(temp.path(), "a/AlphaTest.java", JAVA_SEED);

        let loader = SeedLoader::new().unwrap();
        let files = loader.discover(temp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a/AlphaTest.java"));
    }

    #[test]
    fn test_discover_missing_dir() {
        let loader = SeedLoader::new().unwrap();
        let err = loader.discover(Path::new("/nonexistent/testamp")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn test_load_with_filter() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "org/example/CounterTest.java", JAVA_SEED);

        let loader = SeedLoader::new().unwrap();
        let classes = loader.load(temp.path()).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].tests[0].name(), "testIncrement");

        let filtered = SeedLoader::new()
            .unwrap()
            .with_class_filter(Some("Stack".into()))
            .load(temp.path())
            .unwrap();
        assert!(filtered.is_empty());
    }
}
