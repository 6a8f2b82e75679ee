// Integration test utilities
//
// In-process measurement runners and filesystem fixtures shared by the facade,
// concurrency and property tests.

#![allow(dead_code)]

use fsprobe::fs::{CreateOptions, FileSystem, LocalFileSystem};
use fsprobe::invocation::OperationKind;
use fsprobe::params::ParamSet;
use fsprobe::path::FsPath;
use fsprobe::runner::{BenchmarkRunResult, MeasurementRunner, RunnerError};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use tempfile::TempDir;

/// Records every run and reports success
#[derive(Debug, Default)]
pub struct RecordingRunner {
    runs: Mutex<Vec<(OperationKind, ParamSet)>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn runs(&self) -> Vec<(OperationKind, ParamSet)> {
        self.runs.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

impl MeasurementRunner for RecordingRunner {
    fn run(&self, kind: OperationKind, params: &ParamSet) -> BenchmarkRunResult {
        self.runs.lock().unwrap().push((kind, params.clone()));
        BenchmarkRunResult::success(None)
    }
}

/// Counts runs and always fails
#[derive(Debug, Default)]
pub struct FailingRunner {
    attempts: AtomicUsize,
}

impl FailingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MeasurementRunner for FailingRunner {
    fn run(&self, _kind: OperationKind, _params: &ParamSet) -> BenchmarkRunResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        BenchmarkRunResult::failure(RunnerError::Failed("measurement process crashed".into()))
    }
}

/// Holds the run open until the test has finished its concurrent calls.
///
/// `entered` is reached once the run has started; the run then waits on
/// `release` before returning.
#[derive(Debug)]
pub struct BlockingRunner {
    pub entered: Barrier,
    pub release: Barrier,
    runs: AtomicUsize,
}

impl BlockingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Barrier::new(2),
            release: Barrier::new(2),
            runs: AtomicUsize::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl MeasurementRunner for BlockingRunner {
    fn run(&self, _kind: OperationKind, _params: &ParamSet) -> BenchmarkRunResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.entered.wait();
        self.release.wait();
        BenchmarkRunResult::success(None)
    }
}

/// Temp directory backing a `LocalFileSystem`
pub struct TempStore {
    pub dir: TempDir,
}

impl TempStore {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn fs(&self) -> LocalFileSystem {
        LocalFileSystem::new(self.dir.path())
    }

    /// Create `path` holding `content`
    pub fn seed(&self, path: &str, content: &[u8]) {
        let mut out = self
            .fs()
            .create(&FsPath::from(path), &CreateOptions::default())
            .unwrap();
        out.write_all(content).unwrap();
        out.flush().unwrap();
    }

    pub fn exists(&self, path: &str) -> bool {
        self.fs().exists(&FsPath::from(path)).unwrap()
    }
}
