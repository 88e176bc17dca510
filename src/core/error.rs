//! Error types for the testamp library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using testamp's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort an amplification run or one of its collaborators.
///
/// Failures of individual candidates are not errors at this level; they are
/// reported through [`crate::amplify::CandidateError`] and only remove the
/// candidate from its generation.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Seed source could not be read into the program representation.
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Build or classpath resolution failed.
    #[error("Build error: {0}")]
    Build(String),

    /// Mutation analysis failed.
    #[error("Mutation analysis error: {0}")]
    MutationAnalysis(String),

    /// The seed test could not establish a passing baseline.
    #[error("Baseline for seed {seed} failed: {reason}")]
    Baseline { seed: String, reason: String },

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create a new parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new build error.
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    /// Create a new mutation analysis error.
    pub fn mutation_analysis(message: impl Into<String>) -> Self {
        Self::MutationAnalysis(message.into())
    }

    /// Create a baseline failure for the given seed.
    pub fn baseline(seed: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Baseline {
            seed: seed.into(),
            reason: reason.into(),
        }
    }
}
