//! Mutation-analysis scoring of the final amplified suite.
//!
//! The analysis itself is external (PIT). It runs once, after amplification,
//! and its `mutations.csv` is folded into a [`MutationScore`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::build::BuildArtifacts;
use crate::config::MutationConfig;
use crate::core::{Error, Result};

const MUTATIONS_CSV: &str = "mutations.csv";
/// Column of the detection status in PIT's CSV report.
const STATUS_COLUMN: usize = 5;
/// Column of the mutator name.
const MUTATOR_COLUMN: usize = 2;

/// Detection status of one mutant as reported by PIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantStatus {
    Killed,
    Survived,
    TimedOut,
    NoCoverage,
    MemoryError,
    RunError,
    NonViable,
}

impl MutantStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "KILLED" => Some(Self::Killed),
            "SURVIVED" => Some(Self::Survived),
            "TIMED_OUT" => Some(Self::TimedOut),
            "NO_COVERAGE" => Some(Self::NoCoverage),
            "MEMORY_ERROR" => Some(Self::MemoryError),
            "RUN_ERROR" => Some(Self::RunError),
            "NON_VIABLE" => Some(Self::NonViable),
            _ => None,
        }
    }

    /// Whether the suite detected the mutant.
    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Killed | Self::TimedOut | Self::MemoryError)
    }
}

/// Summary of one mutation analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationScore {
    /// Total mutants, excluding non-viable ones.
    pub total: usize,
    pub killed: usize,
    pub survived: usize,
    pub timed_out: usize,
    pub no_coverage: usize,
    pub errors: usize,
    /// Killed, timed out or memory error.
    pub detected: usize,
    /// Detected / total.
    pub score: f64,
    /// Detected and total counts by mutator.
    pub by_mutator: BTreeMap<String, (usize, usize)>,
}

impl MutationScore {
    /// Parse PIT's CSV report.
    pub fn from_csv(content: &str) -> Self {
        let mut score = Self::default();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let columns: Vec<&str> = line.split(',').collect();
            let Some(status) = columns.get(STATUS_COLUMN).and_then(|s| MutantStatus::parse(s)) else {
                continue;
            };
            if status == MutantStatus::NonViable {
                continue;
            }
            score.total += 1;
            if status.is_detected() {
                score.detected += 1;
            }
            match status {
                MutantStatus::Killed => score.killed += 1,
                MutantStatus::Survived => score.survived += 1,
                MutantStatus::TimedOut => score.timed_out += 1,
                MutantStatus::NoCoverage => score.no_coverage += 1,
                _ => score.errors += 1,
            }
            if let Some(mutator) = columns.get(MUTATOR_COLUMN) {
                let short = mutator.rsplit('.').next().unwrap_or(*mutator).to_string();
                let entry = score.by_mutator.entry(short).or_default();
                entry.1 += 1;
                if status.is_detected() {
                    entry.0 += 1;
                }
            }
        }
        if score.total > 0 {
            score.score = score.detected as f64 / score.total as f64;
        }
        score
    }
}

/// External mutation analysis of an amplified suite.
pub trait MutationAnalysis: Send + Sync {
    fn score(&self, output_dir: &Path, build: &BuildArtifacts) -> Result<MutationScore>;
}

/// Mutation analysis delegated to a PIT invocation.
pub struct PitMutationAnalysis {
    command: String,
    report_dir: PathBuf,
    program_dir: PathBuf,
}

impl PitMutationAnalysis {
    /// `None` when no command is configured.
    pub fn from_config(config: &MutationConfig, program_dir: impl Into<PathBuf>) -> Option<Self> {
        let command = config.command.clone().filter(|c| !c.trim().is_empty())?;
        Some(Self {
            command,
            report_dir: config.report_dir.clone(),
            program_dir: program_dir.into(),
        })
    }

    fn report_root(&self) -> PathBuf {
        if self.report_dir.is_absolute() {
            self.report_dir.clone()
        } else {
            self.program_dir.join(&self.report_dir)
        }
    }
}

impl MutationAnalysis for PitMutationAnalysis {
    fn score(&self, output_dir: &Path, build: &BuildArtifacts) -> Result<MutationScore> {
        tracing::info!("Running mutation analysis: {}", self.command);
        let status = Command::new("sh")
            .args(["-c", &self.command])
            .current_dir(&self.program_dir)
            .env("TESTAMP_OUTPUT_DIR", output_dir)
            .env("TESTAMP_CLASSPATH", build.classpath_string())
            .status()?;
        if !status.success() {
            return Err(Error::mutation_analysis(format!("command exited with {status}")));
        }

        let csv = latest_report(&self.report_root()).ok_or_else(|| {
            Error::mutation_analysis(format!("no {} under {}", MUTATIONS_CSV, self.report_root().display()))
        })?;
        let score = MutationScore::from_csv(&std::fs::read_to_string(&csv)?);
        tracing::info!(
            "Mutation score {:.1}% ({} of {} detected)",
            score.score * 100.0,
            score.detected,
            score.total
        );
        Ok(score)
    }
}

/// Most recently modified `mutations.csv` below `root`. PIT writes
/// timestamped subdirectories unless told otherwise.
fn latest_report(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == MUTATIONS_CSV)
        .max_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()))
        .map(|e| e.into_path())
}
