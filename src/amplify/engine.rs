//! The amplification loop.
//!
//! For every seed: establish a passing baseline, then for each generation
//! amplify the previous generation's survivors, select the fit candidates,
//! synthesize assertions and minimize. Generations are immutable snapshots;
//! the next one is built from the selection, never edited in place.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::Config;
use crate::core::{Error, Result};
use crate::model::{ClassContext, TestClass, TestMethod};
use crate::program::print_statement;

use super::amplifier::{Amplifier, AmplifierRegistry};
use super::candidate::Candidate;
use super::coverage::CoverageSignal;
use super::minimizer::{MinimizeStop, Minimizer};
use super::sandbox::{ExecutionMode, ExecutionRequest};
use super::selector::{FitnessSelector, Proposal};
use super::synthesizer::{AssertionSynthesizer, SynthesisFailure};
use super::worker::SandboxPool;

/// Tunables of the amplification loop.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub generations: u32,
    pub population_cap: usize,
    pub max_candidates: usize,
    pub seed: u64,
    pub probe_runs: usize,
    pub amplifiers: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            generations: config.amplification.generations,
            population_cap: config.amplification.population_cap,
            max_candidates: config.amplification.max_candidates,
            seed: config.amplification.seed,
            probe_runs: config.sandbox.probe_runs,
            amplifiers: config.amplification.amplifiers.clone(),
        }
    }
}

/// One generation of a lineage.
#[derive(Debug, Clone)]
pub struct Generation {
    pub index: u32,
    /// Survivors to amplify next.
    pub members: Vec<Arc<Candidate>>,
    /// Union of every signal accepted in the lineage so far.
    pub accepted: CoverageSignal,
}

impl Generation {
    /// Generation 0: the seed and its baseline coverage.
    pub fn seed(candidate: Candidate) -> Self {
        let accepted = candidate.result.coverage.clone();
        Self {
            index: 0,
            members: vec![Arc::new(candidate)],
            accepted,
        }
    }

    /// The generation formed by `survivors`.
    ///
    /// The accepted union only grows.
    pub fn next(&self, survivors: Vec<Candidate>) -> Self {
        let mut accepted = self.accepted.clone();
        for candidate in &survivors {
            accepted.extend_with(&candidate.result.coverage);
        }
        Self {
            index: self.index + 1,
            members: survivors.into_iter().map(Arc::new).collect(),
            accepted,
        }
    }
}

/// Amplified tests of one seed.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteEntry {
    /// Qualified name of the class the seed belongs to.
    pub class: String,
    #[serde(skip)]
    pub context: Arc<ClassContext>,
    pub tests: Vec<TestMethod>,
}

/// Final amplified tests keyed by seed name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AmplifiedSuite {
    seeds: BTreeMap<String, SuiteEntry>,
}

impl AmplifiedSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tests for `seed`. A seed appears at most once; repeated inserts
    /// extend its entry.
    pub fn insert(&mut self, seed: &str, context: &Arc<ClassContext>, tests: Vec<TestMethod>) {
        if tests.is_empty() {
            return;
        }
        self.seeds
            .entry(seed.to_string())
            .or_insert_with(|| SuiteEntry {
                class: context.qualified_name(),
                context: Arc::clone(context),
                tests: Vec::new(),
            })
            .tests
            .extend(tests);
    }

    pub fn get(&self, seed: &str) -> Option<&SuiteEntry> {
        self.seeds.get(seed)
    }

    pub fn seeds(&self) -> impl Iterator<Item = (&str, &SuiteEntry)> {
        self.seeds.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of amplified tests.
    pub fn len(&self) -> usize {
        self.seeds.values().map(|e| e.tests.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tests grouped by originating class, in class name order.
    pub fn by_class(&self) -> Vec<(Arc<ClassContext>, Vec<&TestMethod>)> {
        let mut grouped: BTreeMap<&str, (Arc<ClassContext>, Vec<&TestMethod>)> = BTreeMap::new();
        for entry in self.seeds.values() {
            grouped
                .entry(entry.class.as_str())
                .or_insert_with(|| (Arc::clone(&entry.context), Vec::new()))
                .1
                .extend(entry.tests.iter());
        }
        grouped.into_values().collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SeedStatus {
    Amplified,
    NoImprovement,
    BaselineFailed(String),
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub index: u32,
    pub candidates: usize,
    pub accepted: usize,
    pub amplified: usize,
    pub selection_executions: usize,
    pub synthesis_executions: usize,
    pub discarded: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub seed: String,
    pub class: String,
    pub status: SeedStatus,
    pub generations: Vec<GenerationReport>,
    pub baseline_coverage: usize,
    pub accepted_coverage: usize,
    pub amplified: usize,
    pub executions: usize,
}

impl SeedReport {
    fn new(seed: &str, context: &ClassContext) -> Self {
        Self {
            seed: seed.to_string(),
            class: context.qualified_name(),
            status: SeedStatus::NoImprovement,
            generations: Vec::new(),
            baseline_coverage: 0,
            accepted_coverage: 0,
            amplified: 0,
            executions: 0,
        }
    }
}

/// Outcome of a whole run. The caller decides what it means for the
/// process exit status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AmplificationReport {
    pub seeds: Vec<SeedReport>,
    pub suite: AmplifiedSuite,
    pub cancelled: bool,
}

impl AmplificationReport {
    pub fn amplified(&self) -> usize {
        self.suite.len()
    }

    pub fn failed_baselines(&self) -> usize {
        self.seeds
            .iter()
            .filter(|s| matches!(s.status, SeedStatus::BaselineFailed(_)))
            .count()
    }
}

/// A finished amplified test and what it cost.
struct Finished {
    test: TestMethod,
    executions: usize,
}

pub struct Engine {
    settings: EngineSettings,
    registry: AmplifierRegistry,
    active: Vec<usize>,
    pool: SandboxPool,
    selector: FitnessSelector,
    synthesizer: AssertionSynthesizer,
    minimizer: Minimizer,
}

impl Engine {
    /// Fails when the configured amplifier list names an unknown amplifier.
    pub fn new(settings: EngineSettings, registry: AmplifierRegistry, pool: SandboxPool) -> Result<Self> {
        if settings.amplifiers.is_empty() {
            return Err(Error::config("no amplifiers configured"));
        }
        let active = registry.resolve_indices(&settings.amplifiers)?;
        Ok(Self {
            selector: FitnessSelector::new(settings.population_cap),
            synthesizer: AssertionSynthesizer::new(settings.probe_runs),
            minimizer: Minimizer::new(),
            settings,
            registry,
            active,
            pool,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The amplifiers applied each generation, in configured order.
    pub fn amplifiers(&self) -> impl Iterator<Item = &dyn Amplifier> {
        self.active.iter().map(|&i| self.registry.amplifiers()[i].as_ref())
    }

    /// Amplify every seed of every class.
    pub fn run(&self, classes: &[TestClass]) -> AmplificationReport {
        let mut report = AmplificationReport::default();
        'classes: for class in classes {
            for seed in &class.tests {
                if self.pool.is_cancelled() {
                    report.cancelled = true;
                    break 'classes;
                }
                let (seed_report, tests) = self.amplify_seed(&class.context, seed);
                if seed_report.status == SeedStatus::Cancelled {
                    report.cancelled = true;
                }
                report.suite.insert(seed.seed_name(), &class.context, tests);
                report.seeds.push(seed_report);
            }
        }
        tracing::info!(
            "Amplified {} tests from {} seeds{}",
            report.amplified(),
            report.seeds.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }

    /// Amplify one seed test.
    pub fn amplify_seed(&self, context: &Arc<ClassContext>, seed: &TestMethod) -> (SeedReport, Vec<TestMethod>) {
        let mut report = SeedReport::new(seed.seed_name(), context);
        let mut amplified = Vec::new();
        tracing::info!(
            "Amplifying {} ({} statements)",
            seed.seed_name(),
            seed.statements().len()
        );

        // seed assertions are not carried into amplified tests
        let seed_test = Arc::new(seed.without_assertions());
        let Some(baseline) = self
            .pool
            .execute(&ExecutionRequest::new(context, &seed_test, ExecutionMode::Coverage))
        else {
            report.status = SeedStatus::Cancelled;
            return (report, amplified);
        };
        report.executions += 1;
        if !baseline.is_passed() {
            let reason = baseline
                .fault
                .as_ref()
                .map(|f| format!("{} ({})", baseline.outcome, f.message))
                .unwrap_or_else(|| baseline.outcome.to_string());
            let err = Error::baseline(seed.seed_name(), reason.clone());
            tracing::warn!("{}", err);
            report.status = SeedStatus::BaselineFailed(reason);
            return (report, amplified);
        }
        report.baseline_coverage = baseline.coverage.len();

        let mut rng = StdRng::seed_from_u64(
            self.settings.seed ^ xxhash_rust::xxh3::xxh3_64(seed.seed_name().as_bytes()),
        );
        let mut seen: HashSet<u64> = HashSet::from([body_hash(&seed_test)]);
        let mut current = Generation::seed(Candidate::seed(seed_test, baseline));

        for index in 1..=self.settings.generations {
            let proposals = self.propose(&current, &mut rng, &mut seen);
            let mut gen_report = GenerationReport {
                index,
                candidates: proposals.len(),
                ..Default::default()
            };
            if proposals.is_empty() {
                tracing::debug!("{}: no candidates in generation {}", seed.seed_name(), index);
                break;
            }

            let label = format!("gen {index}");
            let selection = self
                .selector
                .select(&self.pool, context, &proposals, &current.accepted, &label);
            gen_report.selection_executions = selection.executions;
            report.executions += selection.executions;
            if selection.cancelled {
                report.status = SeedStatus::Cancelled;
                break;
            }
            gen_report.accepted = selection.accepted.len();
            for (reason, count) in &selection.discarded {
                *gen_report.discarded.entry(reason.to_string()).or_default() += count;
            }

            let finished = self
                .pool
                .map(&selection.accepted, |candidate| self.finish(context, candidate));
            if self.pool.is_cancelled() {
                // the interrupted generation is discarded entirely
                report.status = SeedStatus::Cancelled;
                break;
            }

            let mut generation_tests = Vec::new();
            for result in finished {
                match result {
                    Ok(done) => {
                        gen_report.synthesis_executions += done.executions;
                        generation_tests.push(done.test);
                    }
                    Err(SynthesisFailure::Rejected(err)) => {
                        *gen_report.discarded.entry(err.key().to_string()).or_default() += 1;
                    }
                    Err(SynthesisFailure::Cancelled) => {}
                }
            }
            report.executions += gen_report.synthesis_executions;
            gen_report.amplified = generation_tests.len();

            tracing::info!(
                "{} generation {}: {} candidates, {} accepted, {} amplified",
                seed.seed_name(),
                index,
                gen_report.candidates,
                gen_report.accepted,
                gen_report.amplified
            );
            amplified.extend(generation_tests);
            report.generations.push(gen_report);

            if selection.accepted.is_empty() {
                break;
            }
            current = current.next(selection.accepted);
        }

        report.accepted_coverage = current.accepted.len();
        report.amplified = amplified.len();
        if report.status != SeedStatus::Cancelled && !amplified.is_empty() {
            report.status = SeedStatus::Amplified;
        }
        (report, amplified)
    }

    /// Candidates for the next generation, deduplicated and capped.
    fn propose(&self, current: &Generation, rng: &mut StdRng, seen: &mut HashSet<u64>) -> Vec<Proposal> {
        let mut proposals = Vec::new();
        for member in &current.members {
            let parent = Arc::new(member.result.clone());
            for amplifier in self.amplifiers() {
                for child in amplifier.amplify(&member.test, rng) {
                    if seen.insert(body_hash(&child)) {
                        proposals.push(Proposal {
                            test: Arc::new(child),
                            parent: Arc::clone(&parent),
                        });
                    }
                }
            }
        }

        if proposals.len() > self.settings.max_candidates {
            let mut keep =
                rand::seq::index::sample(rng, proposals.len(), self.settings.max_candidates).into_vec();
            keep.sort_unstable();
            let mut keep = keep.into_iter().peekable();
            proposals = proposals
                .into_iter()
                .enumerate()
                .filter(|(i, _)| {
                    if keep.peek() == Some(i) {
                        keep.next();
                        true
                    } else {
                        false
                    }
                })
                .map(|(_, p)| p)
                .collect();
        }
        proposals
    }

    fn finish(&self, context: &ClassContext, candidate: &Candidate) -> std::result::Result<Finished, SynthesisFailure> {
        let synthesized = self.synthesizer.synthesize(&self.pool, context, candidate)?;
        let minimized = self
            .minimizer
            .minimize(&self.pool, context, synthesized.test, &synthesized.result);
        if minimized.stop == MinimizeStop::Cancelled {
            return Err(SynthesisFailure::Cancelled);
        }
        Ok(Finished {
            test: minimized.test,
            executions: synthesized.executions + minimized.executions,
        })
    }
}

/// Hash of a test's rendered statements.
pub fn body_hash(test: &TestMethod) -> u64 {
    let body = test
        .statements()
        .iter()
        .map(|s| print_statement(&s.kind))
        .collect::<Vec<_>>()
        .join("\n");
    xxhash_rust::xxh3::xxh3_64(body.as_bytes())
}
