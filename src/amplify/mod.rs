//! Test amplification engine.
//!
//! Seeds flow through a fixed pipeline per generation:
//!
//! 1. Amplifiers derive candidate tests from the surviving population
//! 2. The sandbox pool executes candidates under coverage
//! 3. The fitness selector keeps candidates with novel coverage or
//!    behavioural differences
//! 4. The assertion synthesizer turns probed values into assertions
//! 5. The minimizer drops statements that do not affect the outcome

mod amplifier;
pub mod amplifiers;
mod candidate;
mod coverage;
mod engine;
mod minimizer;
mod report;
mod sandbox;
mod selector;
mod synthesizer;
mod unit;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use amplifier::{Amplifier, AmplifierRegistry};
pub use candidate::{Candidate, CandidateError};
pub use coverage::CoverageSignal;
pub use engine::{
    body_hash, AmplificationReport, AmplifiedSuite, Engine, EngineSettings, Generation, GenerationReport,
    SeedReport, SeedStatus, SuiteEntry,
};
pub use minimizer::{is_required, MinimizeStop, Minimized, Minimizer};
pub use report::{RunnerFault, RunnerOutcome, RunnerReport, REPORT_FILE};
pub use sandbox::{
    execute_with_timeout, ExecutionMode, ExecutionRequest, ExecutionResult, Fault, FaultKind, Outcome,
    ProcessOutcome, ProcessSandbox, Sandbox, SandboxConfig,
};
pub use selector::{behaves_differently, FitnessSelector, Proposal, Selection};
pub use synthesizer::{probe_points, AssertionSynthesizer, SynthesisFailure, Synthesized};
pub use unit::ExecutionUnit;
pub use worker::{ProgressUpdate, SandboxPool};
