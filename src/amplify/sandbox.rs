//! Execution sandbox.
//!
//! Runs one test method to completion or timeout in an isolated execution
//! unit and reports its outcome, coverage signal and captured values. The
//! [`ProcessSandbox`] delegates the actual compilation and execution to an
//! external runner command; the contract with that runner is a set of
//! environment variables going in and a JSON report coming out.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::build::BuildArtifacts;
use crate::core::Result;
use crate::model::{ClassContext, ObservedValue, ProbePoint, StatementId, TestMethod};
use crate::program::{JavaPrinter, SourcePrinter};

use super::coverage::CoverageSignal;
use super::report::{RunnerReport, REPORT_FILE};
use super::unit::ExecutionUnit;

const RUNNER_LOG: &str = "runner.log";
const LOG_TAIL_LINES: usize = 20;

/// What the runner should capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Outcome only.
    Plain,
    /// Outcome, branch coverage and observations.
    Coverage,
    /// Outcome, coverage and the values at the requested probe points.
    Probe,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Coverage => "coverage",
            Self::Probe => "probe",
        }
    }
}

/// Outcome tag of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Passed,
    Failed,
    Errored,
    TimedOut,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Errored => "ERRORED",
            Self::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The rendered test did not compile.
    Compile,
    /// The test raised an uncaught exception or failed an assertion.
    Exception,
    /// The run exceeded its wall-clock budget.
    Timeout,
    /// The sandbox or runner itself failed.
    Internal,
}

/// Information about why a run did not pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

/// Result of one sandbox execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    #[serde(default)]
    pub coverage: CoverageSignal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
    /// Values observed after statements (coverage mode).
    #[serde(default)]
    pub observations: BTreeMap<StatementId, ObservedValue>,
    /// Values captured at probe points (probe mode).
    #[serde(default)]
    pub probes: BTreeMap<String, ObservedValue>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// A passing run with the given coverage.
    pub fn passed(coverage: CoverageSignal) -> Self {
        Self {
            outcome: Outcome::Passed,
            coverage,
            fault: None,
            observations: BTreeMap::new(),
            probes: BTreeMap::new(),
            duration_ms: 0,
        }
    }

    /// A non-passing run. Coverage is empty.
    pub fn faulted(outcome: Outcome, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            outcome,
            fault: Some(Fault {
                kind,
                message: message.into(),
            }),
            ..Self::passed(CoverageSignal::new())
        }
    }

    /// A run that was killed after exceeding `timeout`.
    ///
    /// Whatever the run covered before the kill is discarded.
    pub fn timed_out(timeout: Duration) -> Self {
        Self::faulted(
            Outcome::TimedOut,
            FaultKind::Timeout,
            format!("exceeded {}s", timeout.as_secs_f64()),
        )
        .with_duration(timeout.as_millis() as u64)
    }

    pub fn errored(message: impl Into<String>) -> Self {
        Self::faulted(Outcome::Errored, FaultKind::Internal, message)
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_observation(mut self, after: StatementId, value: ObservedValue) -> Self {
        self.observations.insert(after, value);
        self
    }

    pub fn with_probe(mut self, id: impl Into<String>, value: ObservedValue) -> Self {
        self.probes.insert(id.into(), value);
        self
    }

    pub fn is_passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// One execution request: a test in the context of its class.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub context: &'a ClassContext,
    pub test: &'a TestMethod,
    pub mode: ExecutionMode,
    pub probes: &'a [ProbePoint],
}

impl<'a> ExecutionRequest<'a> {
    pub fn new(context: &'a ClassContext, test: &'a TestMethod, mode: ExecutionMode) -> Self {
        Self {
            context,
            test,
            mode,
            probes: &[],
        }
    }

    pub fn with_probes(mut self, probes: &'a [ProbePoint]) -> Self {
        self.probes = probes;
        self
    }
}

/// Runs single tests in isolation.
///
/// Implementations must be safe to call concurrently: every call gets its
/// own isolated execution context and enforces its own timeout.
pub trait Sandbox: Send + Sync {
    fn execute(&self, request: &ExecutionRequest<'_>) -> ExecutionResult;
}

/// Configuration for the process sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Shell command that compiles and runs one staged test.
    pub runner_command: String,
    /// Timeout in seconds for each run.
    pub timeout_secs: u64,
    /// Number of parallel runs (0 = available parallelism).
    pub jobs: usize,
    /// Parent directory for execution units.
    pub work_dir: Option<PathBuf>,
    /// Directory of the program under test; the runner's working directory.
    pub program_dir: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runner_command: String::new(),
            timeout_secs: 10,
            jobs: 0,
            work_dir: None,
            program_dir: PathBuf::from("."),
        }
    }
}

impl SandboxConfig {
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            runner_command: command.into(),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn program_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.program_dir = dir.into();
        self
    }

    /// Get the effective number of parallel runs.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1)
        } else {
            self.jobs
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Sandbox that stages each test into a fresh unit and runs an external
/// runner process on it.
pub struct ProcessSandbox {
    config: SandboxConfig,
    build: Arc<BuildArtifacts>,
    printer: Box<dyn SourcePrinter>,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig, build: Arc<BuildArtifacts>) -> Self {
        let printer = JavaPrinter::new().with_timeout_ms(config.timeout_secs.saturating_mul(1000));
        Self {
            config,
            build,
            printer: Box::new(printer),
        }
    }

    pub fn with_printer(mut self, printer: Box<dyn SourcePrinter>) -> Self {
        self.printer = printer;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn stage(&self, unit: &ExecutionUnit, request: &ExecutionRequest<'_>) -> Result<PathBuf> {
        let source = self.printer.print_class(
            request.context,
            &request.context.name,
            std::slice::from_ref(request.test),
        );
        let file_name = format!("{}.{}", request.context.name, self.printer.file_extension());
        let rel = match request.context.package.as_deref().filter(|p| !p.is_empty()) {
            Some(pkg) => format!("src/{}/{}", pkg.replace('.', "/"), file_name),
            None => format!("src/{file_name}"),
        };
        let source_path = unit.write(&rel, source)?;
        unit.write("test.json", serde_json::to_vec_pretty(request.test)?)?;
        unit.write("probes.json", serde_json::to_vec_pretty(request.probes)?)?;
        Ok(source_path)
    }

    fn command(&self, unit: &ExecutionUnit, request: &ExecutionRequest<'_>, source: &Path) -> Result<Command> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.args(["/C", &self.config.runner_command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", &self.config.runner_command]);
            c
        };

        cmd.current_dir(&self.config.program_dir)
            .env("TESTAMP_UNIT_DIR", unit.path())
            .env("TESTAMP_SOURCE", source)
            .env("TESTAMP_CLASS", request.context.qualified_name())
            .env("TESTAMP_METHOD", request.test.name())
            .env("TESTAMP_MODE", request.mode.as_str())
            .env("TESTAMP_PROBES", unit.file("probes.json"))
            .env("TESTAMP_REPORT", unit.file(REPORT_FILE))
            .env("TESTAMP_CLASSPATH", self.build.classpath_string())
            .env("TESTAMP_PROGRAM_DIR", &self.config.program_dir);

        let log = File::create(unit.file(RUNNER_LOG))?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));
        Ok(cmd)
    }

    fn run(&self, unit: &ExecutionUnit, request: &ExecutionRequest<'_>, start: Instant) -> Result<ExecutionResult> {
        let source = self.stage(unit, request)?;
        let mut cmd = self.command(unit, request, &source)?;
        let timeout = self.config.timeout_duration();

        let status = execute_with_timeout(&mut cmd, timeout);
        let elapsed = start.elapsed().as_millis() as u64;

        let result = match status {
            ProcessOutcome::Timeout => return Ok(ExecutionResult::timed_out(timeout)),
            ProcessOutcome::Error(message) => ExecutionResult::errored(message),
            ProcessOutcome::Success | ProcessOutcome::Failed => {
                match RunnerReport::load(&unit.file(REPORT_FILE)) {
                    Ok(Some(report)) => report.into_result(elapsed),
                    Ok(None) if status == ProcessOutcome::Success => {
                        ExecutionResult::passed(CoverageSignal::new())
                    }
                    Ok(None) => ExecutionResult::faulted(
                        Outcome::Failed,
                        FaultKind::Exception,
                        log_tail(unit),
                    ),
                    Err(e) => ExecutionResult::errored(format!("unreadable runner report: {e}")),
                }
            }
        };
        Ok(result.with_duration(elapsed))
    }
}

impl Sandbox for ProcessSandbox {
    fn execute(&self, request: &ExecutionRequest<'_>) -> ExecutionResult {
        let start = Instant::now();
        let unit = match ExecutionUnit::acquire(self.config.work_dir.as_deref()) {
            Ok(unit) => unit,
            Err(e) => return ExecutionResult::errored(format!("cannot create execution unit: {e}")),
        };

        let result = self
            .run(&unit, request, start)
            .unwrap_or_else(|e| ExecutionResult::errored(e.to_string()));

        if let Err(e) = unit.release() {
            tracing::warn!("Failed to remove execution unit: {}", e);
        }

        tracing::trace!(
            "{} [{}] -> {} in {}ms",
            request.test.name(),
            request.mode.as_str(),
            result.outcome,
            result.duration_ms
        );
        result
    }
}

fn log_tail(unit: &ExecutionUnit) -> String {
    let content = std::fs::read_to_string(unit.file(RUNNER_LOG)).unwrap_or_default();
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

/// Status of a finished (or killed) child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exit code 0.
    Success,
    /// Non-zero exit code.
    Failed,
    /// Killed after the timeout.
    Timeout,
    /// Could not spawn or wait on the process.
    Error(String),
}

/// Interval between polls of a running child.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run a command in its own process group, killing the group when the
/// command exceeds `timeout`.
///
/// Runners are usually shells driving a build tool or a JVM, so the whole
/// group is killed rather than the direct child alone. Processes still left
/// in the group after the runner exits are killed as well. The child is
/// always reaped before returning.
pub fn execute_with_timeout(cmd: &mut Command, timeout: Duration) -> ProcessOutcome {
    isolate_group(cmd);
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return ProcessOutcome::Error(format!("failed to spawn runner: {e}")),
    };

    let deadline = Instant::now() + timeout;
    let outcome = loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => break ProcessOutcome::Success,
            Ok(Some(_)) => break ProcessOutcome::Failed,
            Ok(None) if Instant::now() >= deadline => break ProcessOutcome::Timeout,
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => break ProcessOutcome::Error(format!("failed to wait on runner: {e}")),
        }
    };

    kill_group(&child);
    if matches!(outcome, ProcessOutcome::Timeout | ProcessOutcome::Error(_)) {
        let _ = child.kill();
        let _ = child.wait();
    }
    outcome
}

#[cfg(unix)]
fn isolate_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_group(_cmd: &mut Command) {}

/// SIGKILL every process in the child's group.
#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::debug!("Cannot kill runner process group {}: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expr, Statement};
    use tempfile::TempDir;

    fn context() -> ClassContext {
        let mut ctx = ClassContext::new("CounterTest");
        ctx.package = Some("org.example".into());
        ctx
    }

    fn test_method() -> TestMethod {
        TestMethod::seed(
            "testIncrement",
            "org.example.CounterTest#testIncrement",
            vec![Statement::local(1, "Counter", "c", Expr::new_object("Counter", vec![]))],
            vec![],
        )
    }

    fn sandbox(command: &str, work: &TempDir, timeout: u64) -> ProcessSandbox {
        let config = SandboxConfig::with_command(command)
            .timeout(timeout)
            .work_dir(work.path())
            .program_dir(work.path());
        ProcessSandbox::new(config, Arc::new(BuildArtifacts::default()))
    }

    fn execute(sandbox: &ProcessSandbox, mode: ExecutionMode) -> ExecutionResult {
        let ctx = context();
        let test = test_method();
        sandbox.execute(&ExecutionRequest::new(&ctx, &test, mode))
    }

    #[test]
    fn test_sandbox_config_builder() {
        let config = SandboxConfig::with_command("./run.sh").timeout(5).jobs(3);
        assert_eq!(config.runner_command, "./run.sh");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.effective_jobs(), 3);
        assert!(SandboxConfig::default().effective_jobs() >= 1);
    }

    #[test]
    fn test_execute_with_timeout_success() {
        let mut cmd = Command::new("true");
        assert_eq!(execute_with_timeout(&mut cmd, Duration::from_secs(5)), ProcessOutcome::Success);
    }

    #[test]
    fn test_execute_with_timeout_failure() {
        let mut cmd = Command::new("false");
        assert_eq!(execute_with_timeout(&mut cmd, Duration::from_secs(5)), ProcessOutcome::Failed);
    }

    #[test]
    fn test_execute_with_timeout_kills() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let start = Instant::now();
        assert_eq!(
            execute_with_timeout(&mut cmd, Duration::from_millis(100)),
            ProcessOutcome::Timeout
        );
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_execute_with_timeout_spawn_error() {
        let mut cmd = Command::new("/nonexistent/testamp-runner");
        assert!(matches!(
            execute_with_timeout(&mut cmd, Duration::from_secs(1)),
            ProcessOutcome::Error(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_sandbox_reads_report() {
        let work = TempDir::new().unwrap();
        let runner = r#"test -f "$TESTAMP_SOURCE" && printf '{"outcome":"passed","branches":["%s"]}' "$TESTAMP_MODE" > "$TESTAMP_REPORT""#;
        let result = execute(&sandbox(runner, &work, 10), ExecutionMode::Coverage);
        assert_eq!(result.outcome, Outcome::Passed);
        assert!(result.coverage.contains("coverage"));
        // unit removed
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_sandbox_missing_report() {
        let work = TempDir::new().unwrap();
        let passed = execute(&sandbox("exit 0", &work, 10), ExecutionMode::Plain);
        assert_eq!(passed.outcome, Outcome::Passed);
        assert!(passed.coverage.is_empty());

        let failed = execute(&sandbox("echo boom; exit 3", &work, 10), ExecutionMode::Plain);
        assert_eq!(failed.outcome, Outcome::Failed);
        assert!(failed.fault.unwrap().message.contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_sandbox_timeout_discards_coverage() {
        let work = TempDir::new().unwrap();
        let runner = r#"echo '{"outcome":"passed","branches":["b"]}' > "$TESTAMP_REPORT"; exec sleep 10"#;
        let result = execute(&sandbox(runner, &work, 1), ExecutionMode::Coverage);
        assert_eq!(result.outcome, Outcome::TimedOut);
        assert!(result.coverage.is_empty());
        assert_eq!(result.fault.unwrap().kind, FaultKind::Timeout);
    }

    /// Whether `pid` names a live (non-zombie) process.
    #[cfg(target_os = "linux")]
    fn process_alive(pid: &str) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| stat.rsplit(')').next().map(|rest| !rest.trim_start().starts_with('Z')))
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    fn wait_for_exit(pid: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while process_alive(pid) {
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        true
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_sandbox_timeout_kills_runner_children() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let pid_file = scratch.path().join("child.pid");
        let runner = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());

        let result = execute(&sandbox(&runner, &work, 1), ExecutionMode::Plain);
        assert_eq!(result.outcome, Outcome::TimedOut);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(wait_for_exit(pid.trim()), "runner child {} outlived the timeout", pid.trim());
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_sandbox_reclaims_background_processes() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let pid_file = scratch.path().join("child.pid");
        let runner = format!("sleep 30 > /dev/null 2>&1 & echo $! > '{}'", pid_file.display());

        let result = execute(&sandbox(&runner, &work, 10), ExecutionMode::Plain);
        assert_eq!(result.outcome, Outcome::Passed);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(wait_for_exit(pid.trim()), "background process {} survived the run", pid.trim());
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_with_timeout_kills_process_group() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 10 & sleep 10 & wait"]);
        let start = Instant::now();
        assert_eq!(
            execute_with_timeout(&mut cmd, Duration::from_millis(200)),
            ProcessOutcome::Timeout
        );
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_sandbox_garbage_report() {
        let work = TempDir::new().unwrap();
        let result = execute(
            &sandbox(r#"echo 'not json' > "$TESTAMP_REPORT""#, &work, 10),
            ExecutionMode::Plain,
        );
        assert_eq!(result.outcome, Outcome::Errored);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_sandbox_stages_test_json() {
        let work = TempDir::new().unwrap();
        let runner = r#"grep -q testIncrement "$TESTAMP_UNIT_DIR/test.json" && test "$TESTAMP_CLASS" = org.example.CounterTest"#;
        let result = execute(&sandbox(runner, &work, 10), ExecutionMode::Plain);
        assert_eq!(result.outcome, Outcome::Passed);
    }
}
