//! CLI implementation using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Config;

/// testamp - amplify unit tests by generating, selecting and asserting
/// test variants.
#[derive(Parser)]
#[command(name = "testamp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the program under test
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Output format of the run summary
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of parallel test executions (default: number of CPUs)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Amplify the seed tests of the program
    #[command(alias = "amp")]
    Amplify(AmplifyArgs),

    /// List the available amplifiers
    Amplifiers,

    /// Write a default configuration file
    Init(InitArgs),
}

#[derive(Args, Default)]
pub struct AmplifyArgs {
    /// Generations per seed
    #[arg(short, long)]
    pub generations: Option<u32>,

    /// Timeout per test execution in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Amplifiers to apply, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub amplifiers: Option<Vec<String>>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Survivors kept per generation
    #[arg(long)]
    pub population_cap: Option<usize>,

    /// Output directory for amplified classes and the run report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only amplify the named test class (simple or qualified name)
    #[arg(long)]
    pub test_class: Option<String>,

    /// Runner command (overrides sandbox.runner_command)
    #[arg(long)]
    pub runner: Option<String>,

    /// Skip the mutation analysis of the amplified suite
    #[arg(long)]
    pub no_mutation: bool,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,
}

impl AmplifyArgs {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(generations) = self.generations {
            config.amplification.generations = generations;
        }
        if let Some(timeout) = self.timeout {
            config.sandbox.timeout_secs = timeout;
        }
        if let Some(amplifiers) = &self.amplifiers {
            config.amplification.amplifiers = amplifiers.clone();
        }
        if let Some(seed) = self.seed {
            config.amplification.seed = seed;
        }
        if let Some(cap) = self.population_cap {
            config.amplification.population_cap = cap;
        }
        if let Some(output) = &self.output {
            config.paths.output_dir = output.clone();
        }
        if let Some(runner) = &self.runner {
            config.sandbox.runner_command = runner.clone();
        }
        if self.no_mutation {
            config.mutation.command = None;
        }
    }
}

#[derive(Args)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "testamp.toml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Markdown,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_default_path() {
        let cli = Cli::try_parse_from(["testamp", "amplify"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("."));
        assert!(matches!(cli.format, OutputFormat::Text));
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from(["testamp", "-p", "/tmp", "-f", "json", "-j", "4", "-v", "amplify"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("/tmp"));
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.jobs, Some(4));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_amplify_args() {
        let cli = Cli::try_parse_from([
            "testamp",
            "amplify",
            "--generations",
            "5",
            "--amplifiers",
            "value,call-add",
            "--seed",
            "9",
            "--test-class",
            "StackTest",
            "--no-progress",
        ])
        .unwrap();
        let Command::Amplify(args) = cli.command else {
            panic!("expected amplify");
        };
        assert_eq!(args.generations, Some(5));
        assert_eq!(
            args.amplifiers,
            Some(vec!["value".to_string(), "call-add".to_string()])
        );
        assert_eq!(args.test_class.as_deref(), Some("StackTest"));
        assert!(args.no_progress);
    }

    #[test]
    fn test_cli_amp_alias() {
        let cli = Cli::try_parse_from(["testamp", "amp"]).unwrap();
        assert!(matches!(cli.command, Command::Amplify(_)));
    }

    #[test]
    fn test_cli_init_default_output() {
        let cli = Cli::try_parse_from(["testamp", "init"]).unwrap();
        let Command::Init(args) = cli.command else {
            panic!("expected init");
        };
        assert_eq!(args.output, PathBuf::from("testamp.toml"));
        assert!(!args.force);
    }

    #[test]
    fn test_apply_overrides() {
        let args = AmplifyArgs {
            generations: Some(1),
            timeout: Some(2),
            seed: Some(99),
            runner: Some("./run.sh".into()),
            no_mutation: true,
            ..Default::default()
        };
        let mut config = Config::default();
        config.mutation.command = Some("pit".into());
        args.apply(&mut config);
        assert_eq!(config.amplification.generations, 1);
        assert_eq!(config.sandbox.timeout_secs, 2);
        assert_eq!(config.amplification.seed, 99);
        assert_eq!(config.sandbox.runner_command, "./run.sh");
        assert!(config.mutation.command.is_none());
        // untouched
        assert_eq!(config.amplification.population_cap, 10);
    }
}
