//! In-process measurement harness
//!
//! This is what runs inside the `fsprobe measure` child. Every operation kind
//! has a workload with untimed setup, untimed per-iteration preparation, a
//! timed body, and teardown. Workloads that mutate storage only ever touch
//! scratch objects under `<authority>/<scratch_dir>/<kind>-<random hex>`, so a
//! measurement run never changes the objects the intercepted caller is about
//! to operate on.

use crate::fs::{CreateOptions, FileSystem};
use crate::invocation::OperationKind;
use crate::json_output::MeasurementReport;
use crate::params::ParamSet;
use crate::path::FsPath;
use crate::runner::RunnerError;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

pub const DEFAULT_SCRATCH_DIR: &str = ".fsprobe-bench";
pub const DEFAULT_FILE_SIZE_KB: u64 = 1024;

/// Largest scratch payload materialized for rename and copy runs
const MAX_SCRATCH_PAYLOAD: u64 = 64 * 1024 * 1024;
const CHUNK: [u8; 1024] = [0u8; 1024];

/// Iteration counts and scratch location for a measurement run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessOptions {
    pub warmup_iterations: u32,
    pub measurement_iterations: u32,
    /// Directory (relative to the target's authority) for scratch objects
    pub scratch_dir: String,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            warmup_iterations: 1,
            measurement_iterations: 3,
            scratch_dir: DEFAULT_SCRATCH_DIR.to_string(),
        }
    }
}

/// One benchmarked operation
trait Workload {
    fn setup(&mut self, _fs: &dyn FileSystem) -> io::Result<()> {
        Ok(())
    }

    /// Untimed work before each iteration
    fn prepare(&mut self, _fs: &dyn FileSystem) -> io::Result<()> {
        Ok(())
    }

    /// The timed body
    fn execute(&mut self, fs: &dyn FileSystem) -> io::Result<()>;

    fn teardown(&mut self, _fs: &dyn FileSystem) -> io::Result<()> {
        Ok(())
    }
}

/// Runs workloads against a filesystem handle
pub struct Harness<'a> {
    fs: &'a dyn FileSystem,
    options: HarnessOptions,
}

impl<'a> Harness<'a> {
    pub fn new(fs: &'a dyn FileSystem, options: HarnessOptions) -> Self {
        Self { fs, options }
    }

    /// Measure `kind` with `params`, returning the finished report
    pub fn run(&self, kind: OperationKind, params: &ParamSet) -> Result<MeasurementReport, RunnerError> {
        if self.options.measurement_iterations == 0 {
            return Err(RunnerError::InvalidOptions(
                "at least one measurement iteration is required".to_string(),
            ));
        }
        if self.options.scratch_dir.trim_matches('/').is_empty()
            || self.options.scratch_dir.split('/').any(|part| part == "..")
        {
            return Err(RunnerError::InvalidOptions(format!(
                "invalid scratch directory '{}'",
                self.options.scratch_dir
            )));
        }

        let mut workload = self.workload_for(kind, params)?;
        let fresh_dirs = match scratch_anchor(kind, params) {
            Some(anchor) => self.missing_scratch_dirs(&anchor),
            None => Vec::new(),
        };
        let phase_err = |phase: &'static str| {
            move |source: io::Error| RunnerError::Workload {
                operation: kind,
                phase,
                source,
            }
        };

        let measured = workload
            .setup(self.fs)
            .map_err(phase_err("setup"))
            .and_then(|()| {
                self.iterate(kind, params, workload.as_mut())
                    .map_err(phase_err("measurement"))
            });
        let teardown = workload.teardown(self.fs).map_err(phase_err("teardown"));
        self.prune_scratch_dirs(&fresh_dirs);

        let report = measured?;
        teardown?;
        Ok(report)
    }

    /// Scratch directory levels under `anchor` that do not exist yet, outermost
    /// first. Only these are removed again after the run.
    fn missing_scratch_dirs(&self, anchor: &FsPath) -> Vec<FsPath> {
        let mut key = String::new();
        let mut missing = Vec::new();
        let parts = self
            .options
            .scratch_dir
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".");
        for part in parts {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(part);
            let dir = anchor.with_key(&key);
            if !matches!(self.fs.exists(&dir), Ok(true)) {
                missing.push(dir);
            }
        }
        missing
    }

    /// Remove scratch directories this run created, innermost first, stopping
    /// at the first one that is not empty
    fn prune_scratch_dirs(&self, dirs: &[FsPath]) {
        for dir in dirs.iter().rev() {
            match self.fs.list_status(dir) {
                Ok(entries) if entries.is_empty() => {
                    if let Err(e) = self.fs.delete(dir, false) {
                        tracing::debug!(dir = %dir, error = %e, "scratch directory left in place");
                        return;
                    }
                }
                Ok(_) => return,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::debug!(dir = %dir, error = %e, "scratch directory left in place");
                    return;
                }
            }
        }
    }

    fn iterate(
        &self,
        kind: OperationKind,
        params: &ParamSet,
        workload: &mut dyn Workload,
    ) -> io::Result<MeasurementReport> {
        let mut report = MeasurementReport::new(kind, params.clone());
        report.warmup_iterations = self.options.warmup_iterations;

        for _ in 0..self.options.warmup_iterations {
            workload.prepare(self.fs)?;
            workload.execute(self.fs)?;
        }
        for _ in 0..self.options.measurement_iterations {
            workload.prepare(self.fs)?;
            let start = Instant::now();
            workload.execute(self.fs)?;
            report.add_sample(start.elapsed().as_micros() as u64);
        }

        report.finish();
        tracing::debug!(%kind, samples = report.samples_us.len(), "measurement complete");
        Ok(report)
    }

    fn scratch_root(&self, anchor: &FsPath, kind: OperationKind) -> FsPath {
        let suffix = hex::encode(rand::random::<[u8; 6]>());
        anchor.with_key(&format!(
            "{}/{}-{}",
            self.options.scratch_dir.trim_matches('/'),
            kind,
            suffix
        ))
    }

    fn workload_for(&self, kind: OperationKind, params: &ParamSet) -> Result<Box<dyn Workload>, RunnerError> {
        let workload: Box<dyn Workload> = match kind {
            OperationKind::Create => {
                let anchor = FsPath::new(params.require("path")?);
                let permission = params.get("permission").unwrap_or("644");
                let permission = u32::from_str_radix(permission, 8).map_err(|e| {
                    crate::params::ParamError::Invalid {
                        name: "permission".to_string(),
                        value: permission.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let defaults = CreateOptions::default();
                let root = self.scratch_root(&anchor, kind);
                Box::new(CreateWorkload {
                    target: root.join("object"),
                    root,
                    options: CreateOptions {
                        permission,
                        overwrite: params.parse_or("overwrite", defaults.overwrite)?,
                        buffer_size: params.parse_or("buffer_size", defaults.buffer_size)?,
                        replication: params.parse_or("replication", defaults.replication)?,
                        block_size: params.parse_or("block_size", defaults.block_size)?,
                    },
                })
            }
            OperationKind::Open => Box::new(OpenWorkload {
                path: FsPath::new(params.require("path")?),
                buffer: vec![0; params.parse_or("buffer_size", crate::fs::DEFAULT_BUFFER_SIZE)?.max(1)],
            }),
            OperationKind::Rename => {
                let src = FsPath::new(params.require("src")?);
                params.require("dst")?;
                let root = self.scratch_root(&src, kind);
                Box::new(RenameWorkload {
                    real_src: src,
                    from: root.join("a"),
                    to: root.join("b"),
                    root,
                })
            }
            OperationKind::Delete => {
                let anchor = FsPath::new(params.require("path")?);
                let root = self.scratch_root(&anchor, kind);
                Box::new(DeleteWorkload {
                    target: root.join("victim"),
                    root,
                })
            }
            OperationKind::ListStatus => Box::new(ListStatusWorkload {
                path: FsPath::new(params.require("path")?),
            }),
            OperationKind::GetFileStatus => Box::new(GetFileStatusWorkload {
                path: FsPath::new(params.require("path")?),
            }),
            OperationKind::CopyFromLocal => {
                let dst = FsPath::new(params.require("dst")?);
                let file_size_kb = params.parse_or("file_size_kb", DEFAULT_FILE_SIZE_KB)?;
                if file_size_kb == 0 {
                    return Err(RunnerError::InvalidOptions(
                        "file_size_kb must be positive".to_string(),
                    ));
                }
                if copy_payload_bytes(file_size_kb) < file_size_kb.saturating_mul(1024) {
                    tracing::warn!(
                        file_size_kb,
                        cap_bytes = MAX_SCRATCH_PAYLOAD,
                        "copy payload capped"
                    );
                }
                let root = self.scratch_root(&dst, kind);
                let local_src = std::env::temp_dir().join(format!(
                    "fsprobe-copy-{}.tmp",
                    hex::encode(rand::random::<[u8; 6]>())
                ));
                Box::new(CopyFromLocalWorkload {
                    target: root.join("destination"),
                    root,
                    local_src,
                    file_size_kb,
                })
            }
        };
        Ok(workload)
    }
}

/// Where a workload places its scratch objects, if it uses any
fn scratch_anchor(kind: OperationKind, params: &ParamSet) -> Option<FsPath> {
    let name = match kind {
        OperationKind::Create | OperationKind::Delete => "path",
        OperationKind::Rename => "src",
        OperationKind::CopyFromLocal => "dst",
        OperationKind::Open | OperationKind::ListStatus | OperationKind::GetFileStatus => {
            return None
        }
    };
    params.get(name).map(FsPath::new)
}

/// Bytes of local source for a copy run, capped at `MAX_SCRATCH_PAYLOAD`
fn copy_payload_bytes(file_size_kb: u64) -> u64 {
    file_size_kb.saturating_mul(1024).min(MAX_SCRATCH_PAYLOAD)
}

fn write_zeros(out: &mut dyn Write, mut remaining: u64) -> io::Result<()> {
    while remaining > 0 {
        let n = remaining.min(CHUNK.len() as u64) as usize;
        out.write_all(&CHUNK[..n])?;
        remaining -= n as u64;
    }
    out.flush()
}

fn unexpected(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::Other, message)
}

struct CreateWorkload {
    root: FsPath,
    target: FsPath,
    options: CreateOptions,
}

impl Workload for CreateWorkload {
    fn prepare(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        // Without overwrite every iteration after the first would fail
        if !self.options.overwrite {
            fs.delete(&self.target, false)?;
        }
        Ok(())
    }

    fn execute(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        let mut out = fs.create(&self.target, &self.options)?;
        out.flush()
    }

    fn teardown(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        fs.delete(&self.root, true).map(|_| ())
    }
}

struct OpenWorkload {
    path: FsPath,
    buffer: Vec<u8>,
}

impl Workload for OpenWorkload {
    fn execute(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        let mut input = fs.open(&self.path, self.buffer.len())?;
        let read = input.read(&mut self.buffer)?;
        tracing::trace!(path = %self.path, read, "open workload read");
        Ok(())
    }
}

struct RenameWorkload {
    real_src: FsPath,
    root: FsPath,
    from: FsPath,
    to: FsPath,
}

impl Workload for RenameWorkload {
    fn setup(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        // Size the scratch source like the real one so the run is representative
        let len = match fs.get_file_status(&self.real_src) {
            Ok(status) if !status.is_dir => status.len.min(MAX_SCRATCH_PAYLOAD),
            _ => 0,
        };
        let mut out = fs.create(&self.from, &CreateOptions::default())?;
        write_zeros(out.as_mut(), len)
    }

    fn execute(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        if !fs.rename(&self.from, &self.to)? {
            return Err(unexpected(format!(
                "rename {} -> {} returned false",
                self.from, self.to
            )));
        }
        std::mem::swap(&mut self.from, &mut self.to);
        Ok(())
    }

    fn teardown(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        fs.delete(&self.root, true).map(|_| ())
    }
}

struct DeleteWorkload {
    root: FsPath,
    target: FsPath,
}

impl Workload for DeleteWorkload {
    fn prepare(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        let mut out = fs.create(&self.target, &CreateOptions::default())?;
        write_zeros(out.as_mut(), 1)
    }

    fn execute(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        if !fs.delete(&self.target, false)? {
            return Err(unexpected(format!("delete {} returned false", self.target)));
        }
        Ok(())
    }

    fn teardown(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        fs.delete(&self.root, true).map(|_| ())
    }
}

struct ListStatusWorkload {
    path: FsPath,
}

impl Workload for ListStatusWorkload {
    fn execute(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        fs.list_status(&self.path).map(|_| ())
    }
}

struct GetFileStatusWorkload {
    path: FsPath,
}

impl Workload for GetFileStatusWorkload {
    fn execute(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        fs.get_file_status(&self.path).map(|_| ())
    }
}

struct CopyFromLocalWorkload {
    root: FsPath,
    target: FsPath,
    local_src: PathBuf,
    file_size_kb: u64,
}

impl Workload for CopyFromLocalWorkload {
    fn setup(&mut self, _fs: &dyn FileSystem) -> io::Result<()> {
        let mut file = std::fs::File::create(&self.local_src)?;
        write_zeros(&mut file, copy_payload_bytes(self.file_size_kb))
    }

    fn execute(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        fs.copy_from_local_file(false, true, &self.local_src, &self.target)
    }

    fn teardown(&mut self, fs: &dyn FileSystem) -> io::Result<()> {
        let remote = fs.delete(&self.root, true).map(|_| ());
        let local = match std::fs::remove_file(&self.local_src) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
        remote.and(local)
    }
}
