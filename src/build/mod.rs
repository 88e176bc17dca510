//! Build service: compiles the program under test once per run and
//! resolves the classpath every sandbox call runs against.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::BuildConfig;
use crate::core::{Error, Result};

/// Artifacts shared read-only by every sandbox call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildArtifacts {
    pub classpath: Vec<PathBuf>,
}

impl BuildArtifacts {
    pub fn new(classpath: Vec<PathBuf>) -> Self {
        Self { classpath }
    }

    /// Classpath entries joined by `:`.
    pub fn classpath_string(&self) -> String {
        self.classpath
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Produces build artifacts for the program under test.
pub trait BuildService: Send + Sync {
    fn prepare(&self) -> Result<BuildArtifacts>;
}

/// Build service driven by shell commands from the configuration.
pub struct CommandBuild {
    config: BuildConfig,
    program_dir: PathBuf,
}

impl CommandBuild {
    pub fn new(config: BuildConfig, program_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            program_dir: program_dir.into(),
        }
    }

    fn compile(&self, command: &str) -> Result<()> {
        tracing::info!("Compiling program: {}", command);
        let output = shell(command).current_dir(&self.program_dir).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(10).collect();
            return Err(Error::build(format!(
                "compile command failed ({}): {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            )));
        }
        Ok(())
    }

    fn raw_classpath(&self) -> Result<Option<String>> {
        if let Some(file) = &self.config.classpath_file {
            let path = self.program_dir.join(file);
            if !path.exists() {
                return Err(Error::build(format!("classpath file not found: {}", path.display())));
            }
            return Ok(Some(std::fs::read_to_string(path)?));
        }
        if let Some(command) = &self.config.classpath_command {
            let output = shell(command).current_dir(&self.program_dir).output()?;
            if !output.status.success() {
                return Err(Error::build(format!("classpath command failed ({})", output.status)));
            }
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }
        Ok(None)
    }
}

impl BuildService for CommandBuild {
    fn prepare(&self) -> Result<BuildArtifacts> {
        if let Some(command) = &self.config.compile_command {
            self.compile(command)?;
        }
        let classpath = match self.raw_classpath()? {
            Some(raw) => parse_classpath(&raw),
            None => Vec::new(),
        };
        tracing::debug!("Resolved {} classpath entries", classpath.len());
        Ok(BuildArtifacts::new(classpath))
    }
}

/// Split a classpath listing on `:` and newlines, keeping existing
/// absolute entries in order, without duplicates.
pub fn parse_classpath(raw: &str) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in raw.split([':', '\n', '\r']).map(str::trim).filter(|e| !e.is_empty()) {
        let path = Path::new(entry);
        if path.is_absolute() && path.exists() && !entries.iter().any(|e| e == path) {
            entries.push(path.to_path_buf());
        }
    }
    entries
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classpath_string() {
        let artifacts = BuildArtifacts::new(vec![PathBuf::from("/a/classes"), PathBuf::from("/b/lib.jar")]);
        assert_eq!(artifacts.classpath_string(), "/a/classes:/b/lib.jar");
        assert_eq!(BuildArtifacts::default().classpath_string(), "");
    }

    #[test]
    fn test_parse_classpath_keeps_existing_absolute_entries() {
        let temp = TempDir::new().unwrap();
        let classes = temp.path().join("classes");
        std::fs::create_dir(&classes).unwrap();
        let raw = format!(
            "{}:relative/lib.jar\n{}:/does/not/exist.jar\n",
            classes.display(),
            classes.display()
        );
        assert_eq!(parse_classpath(&raw), vec![classes]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_build_reads_classpath_file() {
        let temp = TempDir::new().unwrap();
        let classes = temp.path().join("target/classes");
        let config = BuildConfig {
            compile_command: Some(format!("mkdir -p {}", classes.display())),
            classpath_file: Some(PathBuf::from("cp.txt")),
            classpath_command: None,
        };
        std::fs::write(temp.path().join("cp.txt"), classes.display().to_string()).unwrap();

        let artifacts = CommandBuild::new(config, temp.path()).prepare().unwrap();
        assert_eq!(artifacts.classpath, vec![classes]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_build_classpath_command() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig {
            compile_command: None,
            classpath_file: None,
            classpath_command: Some("pwd".into()),
        };
        let artifacts = CommandBuild::new(config, temp.path()).prepare().unwrap();
        assert_eq!(artifacts.classpath.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_compile_is_build_error() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig {
            compile_command: Some("echo 'error: missing symbol' >&2; exit 3".into()),
            ..Default::default()
        };
        let err = CommandBuild::new(config, temp.path()).prepare().unwrap_err();
        assert!(matches!(err, Error::Build(_)));
        assert!(err.to_string().contains("missing symbol"));
    }

    #[test]
    fn test_missing_classpath_file() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig {
            classpath_file: Some(PathBuf::from("absent.txt")),
            ..Default::default()
        };
        assert!(CommandBuild::new(config, temp.path()).prepare().is_err());
    }
}
