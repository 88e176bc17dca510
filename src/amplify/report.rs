//! The JSON report a runner leaves in its execution unit.
//!
//! ```json
//! {
//!   "outcome": "passed",
//!   "fault": { "exception": "java.lang.IllegalStateException", "message": "empty" },
//!   "branches": ["Stack.java:14:T", "Stack.java:14:F"],
//!   "observations": { "2": { "kind": "int", "value": 3 } },
//!   "probes": { "s2:value:n": { "kind": "int", "value": 3 } }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::core::Result;
use crate::model::{ObservedValue, StatementId};

use super::coverage::CoverageSignal;
use super::sandbox::{ExecutionResult, Fault, FaultKind, Outcome};

/// File name of the report inside the unit.
pub const REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerOutcome {
    Passed,
    Failed,
    Errored,
    CompileError,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerFault {
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerReport {
    pub outcome: RunnerOutcome,
    #[serde(default)]
    pub fault: Option<RunnerFault>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub observations: BTreeMap<StatementId, ObservedValue>,
    #[serde(default)]
    pub probes: BTreeMap<String, ObservedValue>,
}

impl RunnerReport {
    /// Read the report at `path`. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn into_result(self, duration_ms: u64) -> ExecutionResult {
        let outcome = match self.outcome {
            RunnerOutcome::Passed => Outcome::Passed,
            RunnerOutcome::Failed => Outcome::Failed,
            RunnerOutcome::Errored | RunnerOutcome::CompileError => Outcome::Errored,
        };
        let kind = match self.outcome {
            RunnerOutcome::CompileError => FaultKind::Compile,
            RunnerOutcome::Errored => FaultKind::Internal,
            _ => FaultKind::Exception,
        };
        let fault = match (self.fault, self.outcome) {
            (Some(f), _) => Some(Fault {
                kind,
                message: match f.exception {
                    Some(exception) if f.message.is_empty() => exception,
                    Some(exception) => format!("{exception}: {}", f.message),
                    None => f.message,
                },
            }),
            (None, RunnerOutcome::Passed) => None,
            (None, _) => Some(Fault {
                kind,
                message: String::new(),
            }),
        };

        ExecutionResult {
            outcome,
            coverage: self.branches.into_iter().collect::<CoverageSignal>(),
            fault,
            observations: self.observations,
            probes: self.probes,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_report() {
        let report: RunnerReport = serde_json::from_str(
            r#"{
                "outcome": "passed",
                "branches": ["A:1:T", "A:2:F"],
                "observations": {"2": {"kind": "int", "value": 3}},
                "probes": {"s2:value:n": {"kind": "bool", "value": true}}
            }"#,
        )
        .unwrap();
        let result = report.into_result(12);
        assert_eq!(result.outcome, Outcome::Passed);
        assert_eq!(result.coverage.len(), 2);
        assert_eq!(
            result.observations.get(&StatementId(2)),
            Some(&ObservedValue::Int(3))
        );
        assert_eq!(
            result.probes.get("s2:value:n"),
            Some(&ObservedValue::Bool(true))
        );
        assert!(result.fault.is_none());
        assert_eq!(result.duration_ms, 12);
    }

    #[test]
    fn test_compile_error_is_errored() {
        let report: RunnerReport = serde_json::from_str(
            r#"{"outcome": "compile_error", "fault": {"message": "cannot find symbol"}}"#,
        )
        .unwrap();
        let result = report.into_result(0);
        assert_eq!(result.outcome, Outcome::Errored);
        let fault = result.fault.unwrap();
        assert_eq!(fault.kind, FaultKind::Compile);
        assert_eq!(fault.message, "cannot find symbol");
    }

    #[test]
    fn test_failure_fault_message() {
        let report: RunnerReport = serde_json::from_str(
            r#"{"outcome": "failed", "fault": {"exception": "java.lang.ArithmeticException", "message": "/ by zero"}}"#,
        )
        .unwrap();
        let fault = report.into_result(0).fault.unwrap();
        assert_eq!(fault.kind, FaultKind::Exception);
        assert_eq!(fault.message, "java.lang.ArithmeticException: / by zero");
    }

    #[test]
    fn test_missing_report() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(RunnerReport::load(&dir.path().join(REPORT_FILE))
            .unwrap()
            .is_none());
    }
}
