//! Benchmark dispatch
//!
//! Decides whether an intercepted call launches a measurement run, turns the
//! invocation into runner parameters and keeps the toggle consistent no matter
//! how the run ends.

use crate::invocation::{OperationInvocation, OperationKind};
use crate::json_output::MeasurementReport;
use crate::params::ParamSet;
use crate::path::FsPath;
use crate::runner::{MeasurementRunner, RunnerError};
use crate::toggle::ToggleState;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Why a dispatch did not produce a measurement
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("cannot benchmark {kind}: {reason}")]
    InvalidParameters { kind: OperationKind, reason: String },

    #[error("benchmark of {kind} failed: {cause}")]
    RunFailed {
        kind: OperationKind,
        #[source]
        cause: RunnerError,
    },
}

/// What a successful dispatch did
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Benchmarking was disabled or another run was in flight
    Skipped,
    /// A measurement run completed; carries its report when one was produced
    Measured(Option<MeasurementReport>),
}

impl DispatchOutcome {
    pub fn is_measured(&self) -> bool {
        matches!(self, DispatchOutcome::Measured(_))
    }
}

type Derive = fn(&OperationInvocation) -> Result<ParamSet, String>;

const DERIVATIONS: [(OperationKind, Derive); 7] = [
    (OperationKind::Create, derive_create),
    (OperationKind::Open, derive_open),
    (OperationKind::Rename, derive_rename),
    (OperationKind::Delete, derive_delete),
    (OperationKind::ListStatus, derive_single_path),
    (OperationKind::GetFileStatus, derive_single_path),
    (OperationKind::CopyFromLocal, derive_copy_from_local),
];

/// Turn an invocation into the runner's parameter set
pub fn derive_parameters(invocation: &OperationInvocation) -> Result<ParamSet, String> {
    let kind = invocation.kind();
    let expected = kind.target_count();
    let targets = invocation.targets();
    if targets.len() != expected {
        return Err(format!(
            "expected {} target path(s), got {}",
            expected,
            targets.len()
        ));
    }
    if let Some(empty) = targets.iter().position(FsPath::is_empty) {
        return Err(format!("target {} is empty", empty + 1));
    }

    let derive = DERIVATIONS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, derive)| *derive)
        .ok_or_else(|| format!("no parameter derivation for {kind}"))?;
    let mut params = derive(invocation)?;
    // Local sources (`file://`) never name the bucket
    let bucket = targets
        .iter()
        .filter(|target| target.scheme() != Some("file"))
        .find_map(FsPath::authority);
    if let Some(bucket) = bucket {
        params.insert("bucket", bucket);
    }
    Ok(params)
}

/// Copy `name` from the invocation's parameters after checking it parses as `T`
fn carry<T>(invocation: &OperationInvocation, params: &mut ParamSet, name: &str) -> Result<(), String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let source = invocation.parameters();
    if let Some(value) = source.get(name) {
        source.parse::<T>(name).map_err(|e| e.to_string())?;
        params.insert(name, value);
    }
    Ok(())
}

fn with_path(invocation: &OperationInvocation) -> ParamSet {
    ParamSet::new().with("path", &invocation.targets()[0])
}

fn derive_create(invocation: &OperationInvocation) -> Result<ParamSet, String> {
    let mut params = with_path(invocation);
    carry::<bool>(invocation, &mut params, "overwrite")?;
    carry::<usize>(invocation, &mut params, "buffer_size")?;
    carry::<u16>(invocation, &mut params, "replication")?;
    carry::<u64>(invocation, &mut params, "block_size")?;
    if let Some(permission) = invocation.parameters().get("permission") {
        u32::from_str_radix(permission, 8)
            .map_err(|e| format!("invalid permission '{permission}': {e}"))?;
        params.insert("permission", permission);
    }
    Ok(params)
}

fn derive_open(invocation: &OperationInvocation) -> Result<ParamSet, String> {
    let mut params = with_path(invocation);
    carry::<usize>(invocation, &mut params, "buffer_size")?;
    Ok(params)
}

fn derive_rename(invocation: &OperationInvocation) -> Result<ParamSet, String> {
    let targets = invocation.targets();
    Ok(ParamSet::new().with("src", &targets[0]).with("dst", &targets[1]))
}

fn derive_delete(invocation: &OperationInvocation) -> Result<ParamSet, String> {
    let mut params = with_path(invocation);
    carry::<bool>(invocation, &mut params, "recursive")?;
    Ok(params)
}

fn derive_single_path(invocation: &OperationInvocation) -> Result<ParamSet, String> {
    Ok(with_path(invocation))
}

fn derive_copy_from_local(invocation: &OperationInvocation) -> Result<ParamSet, String> {
    let targets = invocation.targets();
    let mut params = ParamSet::new()
        .with("src", &targets[0])
        .with("dst", &targets[1]);
    carry::<bool>(invocation, &mut params, "overwrite")?;
    carry::<bool>(invocation, &mut params, "delete_source")?;
    carry::<u64>(invocation, &mut params, "file_size_kb")?;
    Ok(params)
}

/// Guards and launches measurement runs
#[derive(Clone)]
pub struct BenchmarkDispatcher {
    toggle: Arc<ToggleState>,
    runner: Arc<dyn MeasurementRunner>,
}

impl std::fmt::Debug for BenchmarkDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkDispatcher")
            .field("toggle", &self.toggle.snapshot())
            .finish_non_exhaustive()
    }
}

impl BenchmarkDispatcher {
    pub fn new(toggle: Arc<ToggleState>, runner: Arc<dyn MeasurementRunner>) -> Self {
        Self { toggle, runner }
    }

    pub fn toggle(&self) -> &Arc<ToggleState> {
        &self.toggle
    }

    /// Run at most one measurement for `invocation`.
    ///
    /// Never blocks on other callers: when the toggle is disabled or a run is
    /// already in flight this returns `Skipped` straight away. Whatever
    /// happens, `enabled` is restored and the in-flight flag cleared before
    /// returning.
    pub fn maybe_run_benchmark(
        &self,
        invocation: &OperationInvocation,
    ) -> Result<DispatchOutcome, DispatchError> {
        let kind = invocation.kind();
        let Some(guard) = self.toggle.acquire() else {
            tracing::debug!(%kind, "benchmark skipped");
            return Ok(DispatchOutcome::Skipped);
        };

        let params = derive_parameters(invocation)
            .map_err(|reason| DispatchError::InvalidParameters { kind, reason })?;

        tracing::info!(%kind, targets = ?invocation.targets(), "launching measurement run");
        let start = Instant::now();
        let result = self.runner.run(kind, &params);
        drop(guard);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result.into_result() {
            Ok(report) => {
                tracing::info!(%kind, elapsed_ms, "measurement run succeeded");
                Ok(DispatchOutcome::Measured(report))
            }
            Err(cause) => Err(DispatchError::RunFailed { kind, cause }),
        }
    }
}
