//! Execution units: the isolated working area of one sandbox call.
//!
//! Each unit is a fresh temporary directory. The directory and everything
//! the runner left in it are removed when the unit is dropped, on every
//! path out of the sandbox, including panics.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::Result;

/// RAII handle on a unit directory.
pub struct ExecutionUnit {
    dir: TempDir,
}

impl ExecutionUnit {
    /// Create a new unit below `work_dir`, or below the system temp dir.
    pub fn acquire(work_dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("testamp-unit-");
        let dir = match work_dir {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the unit.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a file into the unit, creating parent directories.
    pub fn write(&self, name: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.file(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Remove the unit now, reporting failures instead of ignoring them.
    pub fn release(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_removed_on_drop() {
        let parent = TempDir::new().unwrap();
        let path = {
            let unit = ExecutionUnit::acquire(Some(parent.path())).unwrap();
            unit.write("pkg/Foo.java", "class Foo {}").unwrap();
            assert!(unit.file("pkg/Foo.java").exists());
            unit.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_unit_removed_on_panic() {
        let parent = TempDir::new().unwrap();
        let parent_path = parent.path().to_path_buf();
        let result = std::panic::catch_unwind(move || {
            let unit = ExecutionUnit::acquire(Some(&parent_path)).unwrap();
            unit.write("report.json", "{}").unwrap();
            panic!("runner crashed");
        });
        assert!(result.is_err());
        assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_units_are_distinct() {
        let a = ExecutionUnit::acquire(None).unwrap();
        let b = ExecutionUnit::acquire(None).unwrap();
        assert_ne!(a.path(), b.path());
        a.release().unwrap();
        b.release().unwrap();
    }
}
