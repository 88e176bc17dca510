//! Writing amplified test classes and run summaries.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::amplify::{AmplificationReport, AmplifiedSuite, SeedReport, SeedStatus};
use crate::core::Result;
use crate::model::{ClassContext, TestMethod};
use crate::program::{JavaPrinter, SourcePrinter};
use crate::scoring::MutationScore;

/// File name of the JSON run report in the output dir.
pub const REPORT_FILE: &str = "testamp-report.json";
/// Suffix of generated test class names.
pub const CLASS_SUFFIX: &str = "Ampl";

/// Output format enum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    Markdown,
    Text,
}

impl Format {
    pub fn write_summary<W: Write>(&self, summary: &RunSummary<'_>, writer: &mut W) -> Result<()> {
        match self {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, summary)?;
                writeln!(writer)?;
            }
            Format::Markdown => format_markdown(summary, writer)?,
            Format::Text => format_text(summary, writer)?,
        }
        Ok(())
    }
}

/// What a run produced.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub generated_at: String,
    pub seeds: usize,
    pub amplified: usize,
    pub failed_baselines: usize,
    pub executions: usize,
    pub cancelled: bool,
    pub files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation: Option<MutationScore>,
    pub results: &'a [SeedReport],
}

impl<'a> RunSummary<'a> {
    pub fn new(report: &'a AmplificationReport, files: Vec<PathBuf>, mutation: Option<MutationScore>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            seeds: report.seeds.len(),
            amplified: report.amplified(),
            failed_baselines: report.failed_baselines(),
            executions: report.seeds.iter().map(|s| s.executions).sum(),
            cancelled: report.cancelled,
            files,
            mutation,
            results: &report.seeds,
        }
    }
}

fn status_label(status: &SeedStatus) -> String {
    match status {
        SeedStatus::Amplified => "amplified".to_string(),
        SeedStatus::NoImprovement => "no improvement".to_string(),
        SeedStatus::BaselineFailed(reason) => format!("baseline failed: {reason}"),
        SeedStatus::Cancelled => "cancelled".to_string(),
    }
}

fn format_markdown<W: Write>(summary: &RunSummary<'_>, writer: &mut W) -> Result<()> {
    writeln!(writer, "# Amplification Report\n")?;
    writeln!(writer, "**Seeds**: {}\n", summary.seeds)?;
    writeln!(writer, "**Amplified Tests**: {}\n", summary.amplified)?;
    writeln!(writer, "**Executions**: {}\n", summary.executions)?;
    if summary.cancelled {
        writeln!(writer, "**Cancelled**: Yes\n")?;
    }
    if let Some(score) = &summary.mutation {
        writeln!(
            writer,
            "**Mutation Score**: {:.2}% ({} of {} detected)\n",
            score.score * 100.0,
            score.detected,
            score.total
        )?;
    }

    if summary.results.is_empty() {
        writeln!(writer, "_No seeds_\n")?;
        return Ok(());
    }
    writeln!(writer, "| Seed | Status | Generations | Amplified | Coverage | Executions |")?;
    writeln!(writer, "| --- | --- | --- | --- | --- | --- |")?;
    for seed in summary.results {
        writeln!(
            writer,
            "| {} | {} | {} | {} | {} -> {} | {} |",
            seed.seed,
            status_label(&seed.status),
            seed.generations.len(),
            seed.amplified,
            seed.baseline_coverage,
            seed.accepted_coverage,
            seed.executions
        )?;
    }
    writeln!(writer)?;

    if !summary.files.is_empty() {
        writeln!(writer, "## Files\n")?;
        for file in &summary.files {
            writeln!(writer, "- `{}`", file.display())?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn format_text<W: Write>(summary: &RunSummary<'_>, writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "{} amplified tests from {} seeds ({} executions){}",
        summary.amplified,
        summary.seeds,
        summary.executions,
        if summary.cancelled { ", cancelled" } else { "" }
    )?;
    for seed in summary.results {
        writeln!(writer, "  {}: {}", seed.seed, status_label(&seed.status))?;
        for generation in &seed.generations {
            writeln!(
                writer,
                "    gen {}: {} candidates, {} accepted, {} amplified",
                generation.index, generation.candidates, generation.accepted, generation.amplified
            )?;
            for (reason, count) in &generation.discarded {
                writeln!(writer, "      {reason}: {count}")?;
            }
        }
    }
    if let Some(score) = &summary.mutation {
        writeln!(writer, "Mutation score: {:.2}%", score.score * 100.0)?;
    }
    for file in &summary.files {
        writeln!(writer, "Wrote {}", file.display())?;
    }
    Ok(())
}

/// Writes amplified classes below an output directory.
pub struct SuiteWriter {
    output_dir: PathBuf,
    printer: Box<dyn SourcePrinter>,
}

impl SuiteWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            printer: Box::new(JavaPrinter::new()),
        }
    }

    pub fn with_printer(mut self, printer: Box<dyn SourcePrinter>) -> Self {
        self.printer = printer;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write one `<Class>Ampl` file per originating class.
    pub fn write_suite(&self, suite: &AmplifiedSuite) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (context, tests) in suite.by_class() {
            let tests: Vec<TestMethod> = tests.into_iter().cloned().collect();
            written.push(self.write_class(&context, &tests)?);
        }
        Ok(written)
    }

    fn write_class(&self, context: &ClassContext, tests: &[TestMethod]) -> Result<PathBuf> {
        let class_name = format!("{}{}", context.name, CLASS_SUFFIX);
        let mut dir = self.output_dir.clone();
        if let Some(pkg) = context.package.as_deref().filter(|p| !p.is_empty()) {
            dir.extend(pkg.split('.'));
        }
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.{}", class_name, self.printer.file_extension()));
        std::fs::write(&path, self.printer.print_class(context, &class_name, tests))?;
        tracing::info!("Wrote {} tests to {}", tests.len(), path.display());
        Ok(path)
    }

    /// Write the JSON run report.
    pub fn write_report(&self, summary: &RunSummary<'_>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(REPORT_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(summary)?)?;
        Ok(path)
    }
}
