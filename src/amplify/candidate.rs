//! Candidates and the reasons candidates are discarded.

use std::sync::Arc;

use thiserror::Error;

use crate::model::TestMethod;

use super::coverage::CoverageSignal;
use super::sandbox::{ExecutionResult, Outcome};

/// A test method with the run it was judged on.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub test: Arc<TestMethod>,
    /// The candidate's own coverage run.
    pub result: ExecutionResult,
    /// The run of the parent it was compared against.
    pub baseline: Arc<ExecutionResult>,
    /// Branches covered beyond the lineage's accepted union.
    pub novelty: CoverageSignal,
}

impl Candidate {
    /// A candidate for a seed, judged against itself.
    pub fn seed(test: Arc<TestMethod>, result: ExecutionResult) -> Self {
        let baseline = Arc::new(result.clone());
        Self {
            test,
            result,
            baseline,
            novelty: CoverageSignal::new(),
        }
    }
}

/// Why a candidate was dropped. Only the candidate is affected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CandidateError {
    #[error("candidate does not compile")]
    CompileFailure,

    #[error("candidate run ended {0}")]
    ExecutionFault(Outcome),

    #[error("probe runs disagree with the selection run")]
    SynthesisNonDeterminism,

    #[error("no probe points to assert on")]
    NoProbes,

    #[error("no stable assertion could be synthesized")]
    UnstableAssertions,
}

impl CandidateError {
    /// Classify a non-passing run.
    pub fn from_result(result: &ExecutionResult) -> Self {
        let compile = result
            .fault
            .as_ref()
            .is_some_and(|f| f.kind == super::sandbox::FaultKind::Compile);
        if compile {
            Self::CompileFailure
        } else {
            Self::ExecutionFault(result.outcome)
        }
    }

    /// Stable key used in reports.
    pub fn key(&self) -> &'static str {
        match self {
            Self::CompileFailure => "compile_failure",
            Self::ExecutionFault(Outcome::Failed) => "failed",
            Self::ExecutionFault(Outcome::Errored) => "errored",
            Self::ExecutionFault(Outcome::TimedOut) => "timed_out",
            Self::ExecutionFault(Outcome::Passed) => "passed",
            Self::SynthesisNonDeterminism => "synthesis_non_determinism",
            Self::NoProbes => "no_probes",
            Self::UnstableAssertions => "unstable_assertions",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amplify::sandbox::FaultKind;

    #[test]
    fn test_classify_compile_failure() {
        let result = ExecutionResult::faulted(Outcome::Errored, FaultKind::Compile, "cannot find symbol");
        assert_eq!(CandidateError::from_result(&result), CandidateError::CompileFailure);
    }

    #[test]
    fn test_classify_timeout() {
        let result = ExecutionResult::timed_out(std::time::Duration::from_secs(1));
        let err = CandidateError::from_result(&result);
        assert_eq!(err, CandidateError::ExecutionFault(Outcome::TimedOut));
        assert_eq!(err.key(), "timed_out");
        assert_eq!(err.to_string(), "candidate run ended TIMED_OUT");
    }
}
