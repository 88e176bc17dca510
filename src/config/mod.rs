//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::core::Result;

const ENV_PREFIX: &str = "TESTAMP_";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation loop and amplifier settings.
    pub amplification: AmplificationConfig,
    /// Test execution.
    pub sandbox: SandboxSection,
    /// Compiling the program under test.
    pub build: BuildConfig,
    /// Mutation analysis of the final suite.
    pub mutation: MutationConfig,
    /// Input and output locations.
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from an explicit file, which must exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(crate::core::Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        // syntax errors keep their line and column
        toml::from_str::<toml::Table>(&text)?;
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(&text))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| crate::core::Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from a file path (alias for from_file).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file(path)
    }

    /// Load `testamp.toml` or `.testamp/testamp.toml` from `dir` if present,
    /// then apply environment overrides.
    pub fn load_default(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(dir.join("testamp.toml")))
            .merge(Toml::file(dir.join(".testamp/testamp.toml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| crate::core::Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// The commented default configuration file.
    pub fn default_toml() -> &'static str {
        include_str!("default_config.toml")
    }
}

/// Amplification loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmplificationConfig {
    /// Number of generations per seed.
    pub generations: u32,
    /// Maximum survivors kept per generation.
    pub population_cap: usize,
    /// Maximum candidates executed per generation.
    pub max_candidates: usize,
    /// Amplifiers to apply, in order.
    pub amplifiers: Vec<String>,
    /// Random seed; equal seeds give equal runs.
    pub seed: u64,
    /// Maximum statements the statement adder inserts per candidate.
    pub max_insertions: usize,
    /// Only API methods of classes with this prefix are used.
    pub api_prefix: Option<String>,
    /// API surface available to the statement adder.
    pub api: Vec<ApiMethod>,
    /// Value pool.
    pub values: ValuesConfig,
}

impl Default for AmplificationConfig {
    fn default() -> Self {
        Self {
            generations: 3,
            population_cap: 10,
            max_candidates: 200,
            amplifiers: ["value", "call-add", "call-remove", "statement-add"]
                .into_iter()
                .map(String::from)
                .collect(),
            seed: 23,
            max_insertions: 3,
            api_prefix: None,
            api: Vec::new(),
            values: ValuesConfig::default(),
        }
    }
}

impl AmplificationConfig {
    /// Configured API methods, filtered by `api_prefix`.
    pub fn api_surface(&self) -> Vec<ApiMethod> {
        self.api
            .iter()
            .filter(|m| self.api_prefix.as_deref().is_none_or(|p| m.class.starts_with(p)))
            .cloned()
            .collect()
    }
}

/// A method of the program under test the statement adder may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMethod {
    /// Declaring class (simple or qualified name).
    pub class: String,
    pub method: String,
    /// Parameter types.
    #[serde(default)]
    pub params: Vec<String>,
    /// Return type; `None` for void.
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

/// Literal values amplifiers draw from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuesConfig {
    pub ints: Vec<i64>,
    pub doubles: Vec<f64>,
    pub strings: Vec<String>,
    pub chars: Vec<char>,
    /// Add neighbours of the original value (n+1, n-1, 2n, n/2).
    pub derive_neighbours: bool,
    /// Random values drawn per literal.
    pub random_draws: usize,
}

impl Default for ValuesConfig {
    fn default() -> Self {
        Self {
            ints: vec![
                0,
                1,
                -1,
                i64::from(i32::MAX),
                i64::from(i32::MIN),
            ],
            doubles: vec![0.0, 1.0, -1.0, f64::from(f32::MAX)],
            strings: vec![String::new(), " ".to_string()],
            chars: vec!['\0', ' ', 'a'],
            derive_neighbours: true,
            random_draws: 1,
        }
    }
}

/// Sandbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Shell command that compiles and runs one staged test.
    pub runner_command: String,
    /// Timeout per execution in seconds.
    pub timeout_secs: u64,
    /// Parallel executions (0 = available parallelism).
    pub jobs: usize,
    /// Parent directory for execution units (default: system temp).
    pub work_dir: Option<PathBuf>,
    /// Probe runs per retained candidate; values must agree across all.
    pub probe_runs: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            runner_command: String::new(),
            timeout_secs: 10,
            jobs: 0,
            work_dir: None,
            probe_runs: 2,
        }
    }
}

/// Build configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Command compiling the program and its tests.
    pub compile_command: Option<String>,
    /// File listing the classpath, relative to the program dir.
    pub classpath_file: Option<PathBuf>,
    /// Command printing the classpath.
    pub classpath_command: Option<String>,
}

/// Mutation analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Command running the mutation analysis; disabled when unset.
    pub command: Option<String>,
    /// Where the command writes its reports.
    pub report_dir: PathBuf,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            command: None,
            report_dir: PathBuf::from("target/pit-reports"),
        }
    }
}

/// Input and output locations, relative to the program dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub program_dir: PathBuf,
    /// Where seed tests are discovered.
    pub test_dir: PathBuf,
    /// Where amplified classes and the run report are written.
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            program_dir: PathBuf::from("."),
            test_dir: PathBuf::from("src/test/java"),
            output_dir: PathBuf::from("target/testamp-out"),
        }
    }
}

impl PathsConfig {
    /// `path` resolved against `root` unless absolute.
    pub fn resolve(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}
