//! Measurement runners
//!
//! A `MeasurementRunner` executes one isolated measurement of an operation and
//! reports whether it succeeded. `ForkedRunner` re-executes the `fsprobe`
//! binary in `measure` mode so the run gets its own process, its own
//! filesystem handle, and benchmarking disabled in its environment.

use crate::config::ENABLE_ENV;
use crate::harness::HarnessOptions;
use crate::invocation::OperationKind;
use crate::json_output::MeasurementReport;
use crate::params::{ParamError, ParamSet};
use crate::stats;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Why a measurement run failed
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to launch measurement process {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("measurement process exited with {status}")]
    ChildFailed { status: String },

    #[error("measurement process timed out after {0:?}")]
    TimedOut(Duration),

    #[error("measurement process produced an invalid report: {0}")]
    InvalidReport(#[from] serde_json::Error),

    #[error("{operation} workload failed during {phase}: {source}")]
    Workload {
        operation: OperationKind,
        phase: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Params(#[from] ParamError),

    #[error("invalid harness options: {0}")]
    InvalidOptions(String),

    #[error("measurement run failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of one measurement run
#[derive(Debug)]
pub struct BenchmarkRunResult {
    failure_cause: Option<RunnerError>,
    report: Option<MeasurementReport>,
}

impl BenchmarkRunResult {
    pub fn success(report: Option<MeasurementReport>) -> Self {
        Self {
            failure_cause: None,
            report,
        }
    }

    pub fn failure(cause: RunnerError) -> Self {
        Self {
            failure_cause: Some(cause),
            report: None,
        }
    }

    pub fn failure_cause(&self) -> Option<&RunnerError> {
        self.failure_cause.as_ref()
    }

    pub fn into_result(self) -> Result<Option<MeasurementReport>, RunnerError> {
        match self.failure_cause {
            None => Ok(self.report),
            Some(cause) => Err(cause),
        }
    }
}

impl From<Result<MeasurementReport, RunnerError>> for BenchmarkRunResult {
    fn from(result: Result<MeasurementReport, RunnerError>) -> Self {
        match result {
            Ok(report) => Self::success(Some(report)),
            Err(cause) => Self::failure(cause),
        }
    }
}

/// Executes isolated measurement runs
pub trait MeasurementRunner: Send + Sync {
    /// Measure `kind` with `params`. Must be safe to call repeatedly.
    fn run(&self, kind: OperationKind, params: &ParamSet) -> BenchmarkRunResult;
}

/// Runs each measurement in a child `fsprobe measure` process
#[derive(Debug, Clone)]
pub struct ForkedRunner {
    program: PathBuf,
    root: PathBuf,
    options: HarnessOptions,
    timeout: Option<Duration>,
    grace: Duration,
    report_dir: Option<PathBuf>,
}

impl ForkedRunner {
    /// `program` must be an `fsprobe` binary; `root` is the storage root the
    /// child opens
    pub fn new(program: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            root: root.into(),
            options: HarnessOptions::default(),
            timeout: None,
            grace: DEFAULT_GRACE,
            report_dir: None,
        }
    }

    /// Re-execute the running binary
    pub fn current_exe(root: impl Into<PathBuf>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, root))
    }

    pub fn with_options(mut self, options: HarnessOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Time between SIGTERM and SIGKILL for a timed out child
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_report_dir(mut self, report_dir: Option<PathBuf>) -> Self {
        self.report_dir = report_dir;
        self
    }

    /// The child command line for one run
    pub fn command(&self, kind: OperationKind, params: &ParamSet) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--root")
            .arg(&self.root)
            .arg("measure")
            .arg("--kind")
            .arg(kind.as_str())
            .arg("--warmup")
            .arg(self.options.warmup_iterations.to_string())
            .arg("--iterations")
            .arg(self.options.measurement_iterations.to_string())
            .arg("--scratch-dir")
            .arg(&self.options.scratch_dir);
        for assignment in params.to_assignments() {
            command.arg("--param").arg(assignment);
        }
        command
            .env(ENABLE_ENV, "false")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        command
    }

    fn execute(&self, kind: OperationKind, params: &ParamSet) -> Result<MeasurementReport, RunnerError> {
        eprintln!("[fsprobe: benchmark triggered for {}]", kind);
        for (name, value) in params.iter() {
            eprintln!("[fsprobe:   {} = {}]", name, value);
        }

        let mut child = self
            .command(kind, params)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        tracing::debug!(pid = child.id(), %kind, "measurement process started");

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Failed("child stdout was not captured".to_string()))?;
        let reader = thread::spawn(move || {
            let mut output = String::new();
            stdout.read_to_string(&mut output).map(|_| output)
        });

        let status = self.wait(&mut child)?;
        let output = reader
            .join()
            .map_err(|_| RunnerError::Failed("stdout reader panicked".to_string()))??;

        if !status.success() {
            tracing::error!(%kind, %status, "measurement process failed");
            return Err(RunnerError::ChildFailed {
                status: status.to_string(),
            });
        }

        let report = MeasurementReport::from_json(&output)?;
        stats::print_summary(kind.as_str(), report.summary.as_ref());

        if let Some(dir) = &self.report_dir {
            match report.write_to_dir(dir) {
                Ok(path) => eprintln!("[fsprobe: report written to {}]", path.display()),
                Err(e) => tracing::warn!(error = %e, dir = %dir.display(), "failed to write report"),
            }
        }
        eprintln!("[fsprobe: benchmark finished for {}]", kind);
        Ok(report)
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, RunnerError> {
        self.wait_with(child, Child::try_wait)
    }

    /// Poll `child` until it exits or the timeout passes. Any way out other
    /// than an exit status leaves no child behind.
    fn wait_with(
        &self,
        child: &mut Child,
        mut poll: impl FnMut(&mut Child) -> io::Result<Option<ExitStatus>>,
    ) -> Result<ExitStatus, RunnerError> {
        let deadline = self.timeout.map(|timeout| (timeout, Instant::now() + timeout));
        loop {
            match poll(child) {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(pid = child.id(), error = %e, "lost track of measurement process");
                    self.terminate(child);
                    return Err(e.into());
                }
            }
            if let Some((timeout, deadline)) = deadline {
                if Instant::now() >= deadline {
                    self.terminate(child);
                    return Err(RunnerError::TimedOut(timeout));
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// SIGTERM, then SIGKILL once the grace period runs out
    fn terminate(&self, child: &mut Child) {
        let pid = Pid::from_raw(child.id() as i32);
        if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
            tracing::warn!(%pid, error = %e, "failed to signal measurement process");
        }

        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl MeasurementRunner for ForkedRunner {
    fn run(&self, kind: OperationKind, params: &ParamSet) -> BenchmarkRunResult {
        self.execute(kind, params).into()
    }
}
