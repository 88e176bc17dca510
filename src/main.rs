//! testamp CLI - unit test amplification.

use std::io::{stdout, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use testamp::amplify::{AmplifierRegistry, Engine, EngineSettings, ProcessSandbox, SandboxConfig, SandboxPool};
use testamp::build::{BuildService, CommandBuild};
use testamp::cli::{AmplifyArgs, Cli, Command, InitArgs, OutputFormat};
use testamp::config::{Config, PathsConfig};
use testamp::core::progress::{create_spinner, is_tty};
use testamp::core::{CancellationToken, Error, Result};
use testamp::output::{Format, RunSummary, SuiteWriter};
use testamp::program::SeedLoader;
use testamp::scoring::{MutationAnalysis, PitMutationAnalysis};

/// Exit status when the run completed but amplified nothing.
const EXIT_NOTHING_AMPLIFIED: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let format = match cli.format {
        OutputFormat::Json => Format::Json,
        OutputFormat::Markdown => Format::Markdown,
        OutputFormat::Text => Format::Text,
    };

    match &cli.command {
        Command::Amplify(args) => {
            let mut config = match &cli.config {
                Some(path) => Config::from_file(path)?,
                None => Config::load_default(&cli.path)?,
            };
            if let Some(jobs) = cli.jobs {
                config.sandbox.jobs = jobs;
            }
            args.apply(&mut config);
            amplify(&cli.path, config, args, format)
        }
        Command::Amplifiers => {
            let config = match &cli.config {
                Some(path) => Config::from_file(path)?,
                None => Config::load_default(&cli.path)?,
            };
            list_amplifiers(&config, format)?;
            Ok(0)
        }
        Command::Init(args) => {
            init(args)?;
            Ok(0)
        }
    }
}

fn amplify(root: &Path, config: Config, args: &AmplifyArgs, format: Format) -> Result<u8> {
    if config.sandbox.runner_command.trim().is_empty() {
        return Err(Error::config(
            "sandbox.runner_command is not set (use --runner or the config file)",
        ));
    }
    let program_dir = PathsConfig::resolve(root, &config.paths.program_dir);
    let test_dir = PathsConfig::resolve(&program_dir, &config.paths.test_dir);
    let output_dir = PathsConfig::resolve(&program_dir, &config.paths.output_dir);
    let show_progress = !args.no_progress && is_tty();

    let classes = SeedLoader::new()?
        .with_class_filter(args.test_class.clone())
        .load(&test_dir)?;
    if classes.is_empty() {
        tracing::warn!("No seed tests found under {}", test_dir.display());
    }

    let spinner = create_spinner("Building program...", show_progress);
    let artifacts = CommandBuild::new(config.build.clone(), &program_dir).prepare();
    spinner.finish_and_clear();
    let artifacts = Arc::new(artifacts?);

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("Interrupted; finishing in-flight executions");
        handler_token.cancel();
    }) {
        tracing::warn!("Cannot install interrupt handler: {}", e);
    }

    let sandbox_config = SandboxConfig {
        runner_command: config.sandbox.runner_command.clone(),
        timeout_secs: config.sandbox.timeout_secs,
        jobs: config.sandbox.jobs,
        work_dir: config.sandbox.work_dir.clone(),
        program_dir: program_dir.clone(),
    };
    let jobs = sandbox_config.effective_jobs();
    let sandbox = ProcessSandbox::new(sandbox_config, Arc::clone(&artifacts));
    let pool = SandboxPool::new(Arc::new(sandbox), jobs, cancel)?.with_progress(show_progress);
    let engine = Engine::new(
        EngineSettings::from_config(&config),
        AmplifierRegistry::builtin(&config.amplification),
        pool,
    )?;

    let report = engine.run(&classes);

    let writer = SuiteWriter::new(&output_dir);
    let files = writer.write_suite(&report.suite)?;

    let mutation = match PitMutationAnalysis::from_config(&config.mutation, &program_dir) {
        Some(analysis) if !files.is_empty() && !report.cancelled => {
            match analysis.score(&output_dir, &artifacts) {
                Ok(score) => Some(score),
                Err(e) => {
                    tracing::warn!("{}", e);
                    None
                }
            }
        }
        _ => None,
    };

    let summary = RunSummary::new(&report, files, mutation);
    let report_path = writer.write_report(&summary)?;
    tracing::debug!("Run report written to {}", report_path.display());
    format.write_summary(&summary, &mut stdout())?;

    Ok(if report.amplified() > 0 { 0 } else { EXIT_NOTHING_AMPLIFIED })
}

#[derive(Serialize)]
struct AmplifierInfo {
    name: &'static str,
    description: &'static str,
}

fn list_amplifiers(config: &Config, format: Format) -> Result<()> {
    let registry = AmplifierRegistry::builtin(&config.amplification);
    let infos: Vec<AmplifierInfo> = registry
        .amplifiers()
        .iter()
        .map(|a| AmplifierInfo {
            name: a.name(),
            description: a.description(),
        })
        .collect();

    let mut out = stdout();
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut out, &infos)?;
            writeln!(out)?;
        }
        Format::Markdown => {
            writeln!(out, "| Amplifier | Description |")?;
            writeln!(out, "| --- | --- |")?;
            for info in &infos {
                writeln!(out, "| {} | {} |", info.name, info.description)?;
            }
        }
        Format::Text => {
            for info in &infos {
                writeln!(out, "{:<14} {}", info.name, info.description)?;
            }
        }
    }
    Ok(())
}

fn init(args: &InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(Error::InvalidArgument(format!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        )));
    }
    std::fs::write(&args.output, Config::default_toml())?;
    println!("Wrote {}", args.output.display());
    Ok(())
}
