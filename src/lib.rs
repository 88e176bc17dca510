//! testamp - unit test amplification.
//!
//! testamp takes existing JUnit tests as seeds and derives new tests from
//! them: amplifiers mutate literal values and method calls, a sandbox runs
//! each candidate in isolation under coverage, a fitness selector keeps the
//! candidates that reach new branches or behave differently, assertions are
//! synthesized from observed values, and a minimizer removes statements that
//! do not matter.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use testamp::amplify::{AmplifierRegistry, Engine, EngineSettings, ProcessSandbox, SandboxConfig, SandboxPool};
//! use testamp::build::BuildArtifacts;
//! use testamp::config::Config;
//! use testamp::core::CancellationToken;
//! use testamp::program::SeedLoader;
//!
//! let config = Config::default();
//! let classes = SeedLoader::new().unwrap().load("src/test/java".as_ref()).unwrap();
//! let sandbox = ProcessSandbox::new(
//!     SandboxConfig::with_command("./run-test.sh"),
//!     Arc::new(BuildArtifacts::default()),
//! );
//! let pool = SandboxPool::new(Arc::new(sandbox), 4, CancellationToken::new()).unwrap();
//! let engine = Engine::new(
//!     EngineSettings::from_config(&config),
//!     AmplifierRegistry::builtin(&config.amplification),
//!     pool,
//! )
//! .unwrap();
//! let report = engine.run(&classes);
//! println!("Amplified {} tests", report.amplified());
//! ```

pub mod amplify;
pub mod build;
pub mod cli;
pub mod config;
pub mod core;
pub mod model;
pub mod output;
pub mod program;
pub mod scoring;

pub use amplify::{AmplificationReport, Engine};
