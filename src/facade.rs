//! Intercepting filesystem facade
//!
//! `InterceptingFacade` wraps a real filesystem and implements `FileSystem`
//! itself. Every call first offers itself to the dispatcher for measurement,
//! then runs on the real filesystem and returns that result untouched.
//! Measurement failures are logged and counted, never returned.

use crate::config::ProbeConfig;
use crate::dispatch::{BenchmarkDispatcher, DispatchOutcome};
use crate::fs::{CreateOptions, FileStatus, FileSystem, InputStream, OutputStream};
use crate::invocation::OperationInvocation;
use crate::path::FsPath;
use crate::runner::MeasurementRunner;
use crate::toggle::ToggleState;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Size recorded for `copy_from_local` when the local source cannot be read
const UNKNOWN_FILE_SIZE_KB: u64 = 1024;

/// Counters of what the facade did with intercepted calls
#[derive(Debug, Default)]
pub struct FacadeStats {
    calls: AtomicU64,
    measured: AtomicU64,
    skipped: AtomicU64,
    dispatch_failures: AtomicU64,
}

/// Copy of [`FacadeStats`] at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FacadeStatsSnapshot {
    pub calls: u64,
    pub measured: u64,
    pub skipped: u64,
    pub dispatch_failures: u64,
}

impl FacadeStats {
    pub fn snapshot(&self) -> FacadeStatsSnapshot {
        FacadeStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            measured: self.measured.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }
}

/// Benchmarking wrapper around a real filesystem
#[derive(Debug)]
pub struct InterceptingFacade<F> {
    inner: F,
    dispatcher: BenchmarkDispatcher,
    stats: FacadeStats,
}

impl<F: FileSystem> InterceptingFacade<F> {
    /// Wrap `inner` with its own toggle seeded from `enabled`
    pub fn new(inner: F, runner: Arc<dyn MeasurementRunner>, enabled: bool) -> Self {
        Self::with_toggle(inner, runner, Arc::new(ToggleState::new(enabled)))
    }

    /// Wrap `inner` sharing an existing toggle
    pub fn with_toggle(inner: F, runner: Arc<dyn MeasurementRunner>, toggle: Arc<ToggleState>) -> Self {
        Self {
            inner,
            dispatcher: BenchmarkDispatcher::new(toggle, runner),
            stats: FacadeStats::default(),
        }
    }

    /// Wrap `inner` using the process-wide toggle seeded from `config`
    pub fn from_config(inner: F, runner: Arc<dyn MeasurementRunner>, config: &ProbeConfig) -> Self {
        Self::with_toggle(
            inner,
            runner,
            ToggleState::process_wide(config.benchmark.enable),
        )
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn toggle(&self) -> &Arc<ToggleState> {
        self.dispatcher.toggle()
    }

    pub fn stats(&self) -> FacadeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Offer `invocation` for measurement, then run `delegate` on the real
    /// filesystem and return its result unchanged
    fn intercept<T>(
        &self,
        invocation: OperationInvocation,
        delegate: impl FnOnce(&F) -> io::Result<T>,
    ) -> io::Result<T> {
        self.stats.calls.fetch_add(1, Ordering::Relaxed);
        match self.dispatcher.maybe_run_benchmark(&invocation) {
            Ok(DispatchOutcome::Measured(_)) => {
                self.stats.measured.fetch_add(1, Ordering::Relaxed);
            }
            Ok(DispatchOutcome::Skipped) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%invocation, error = %e, "benchmark dispatch failed, continuing with real operation");
            }
        }
        delegate(&self.inner)
    }
}

fn local_size_kb(src: &Path) -> u64 {
    match std::fs::metadata(src) {
        Ok(meta) => meta.len().div_ceil(1024).max(1),
        Err(_) => UNKNOWN_FILE_SIZE_KB,
    }
}

impl<F: FileSystem> FileSystem for InterceptingFacade<F> {
    fn create(&self, path: &FsPath, options: &CreateOptions) -> io::Result<OutputStream> {
        self.intercept(OperationInvocation::create(path, options), |fs| {
            fs.create(path, options)
        })
    }

    fn open(&self, path: &FsPath, buffer_size: usize) -> io::Result<InputStream> {
        self.intercept(OperationInvocation::open(path, buffer_size), |fs| {
            fs.open(path, buffer_size)
        })
    }

    fn rename(&self, src: &FsPath, dst: &FsPath) -> io::Result<bool> {
        self.intercept(OperationInvocation::rename(src, dst), |fs| fs.rename(src, dst))
    }

    fn delete(&self, path: &FsPath, recursive: bool) -> io::Result<bool> {
        self.intercept(OperationInvocation::delete(path, recursive), |fs| {
            fs.delete(path, recursive)
        })
    }

    fn list_status(&self, path: &FsPath) -> io::Result<Vec<FileStatus>> {
        self.intercept(OperationInvocation::list_status(path), |fs| fs.list_status(path))
    }

    fn get_file_status(&self, path: &FsPath) -> io::Result<FileStatus> {
        self.intercept(OperationInvocation::get_file_status(path), |fs| {
            fs.get_file_status(path)
        })
    }

    fn copy_from_local_file(
        &self,
        delete_source: bool,
        overwrite: bool,
        src: &Path,
        dst: &FsPath,
    ) -> io::Result<()> {
        let invocation = OperationInvocation::copy_from_local(
            delete_source,
            overwrite,
            &FsPath::from_local(src),
            dst,
            Some(local_size_kb(src)),
        );
        self.intercept(invocation, |fs| {
            fs.copy_from_local_file(delete_source, overwrite, src, dst)
        })
    }
}
