//! Facade overhead benchmark
//!
//! Compares a raw `get_file_status` against the same call through the
//! intercepting facade with benchmarking disabled, which is the steady state
//! of a deployed facade. The difference is the cost of one failed
//! compare-and-set plus the invocation construction.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench facade_overhead
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fsprobe::dispatch::derive_parameters;
use fsprobe::facade::InterceptingFacade;
use fsprobe::fs::{CreateOptions, FileSystem, LocalFileSystem};
use fsprobe::invocation::{OperationInvocation, OperationKind};
use fsprobe::params::ParamSet;
use fsprobe::path::FsPath;
use fsprobe::runner::{BenchmarkRunResult, MeasurementRunner};
use std::sync::Arc;

/// Never reached while the toggle is disabled
struct NoopRunner;

impl MeasurementRunner for NoopRunner {
    fn run(&self, _kind: OperationKind, _params: &ParamSet) -> BenchmarkRunResult {
        BenchmarkRunResult::success(None)
    }
}

fn bench_get_file_status(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let raw = LocalFileSystem::new(dir.path());
    let path = FsPath::from("gs://bench/object");
    drop(raw.create(&path, &CreateOptions::default()).unwrap());
    let facade = InterceptingFacade::new(raw.clone(), Arc::new(NoopRunner), false);

    let mut group = c.benchmark_group("get_file_status");
    group.bench_function("raw", |b| {
        b.iter(|| raw.get_file_status(black_box(&path)).unwrap())
    });
    group.bench_function("facade_disabled", |b| {
        b.iter(|| facade.get_file_status(black_box(&path)).unwrap())
    });
    group.finish();
}

fn bench_derive_parameters(c: &mut Criterion) {
    let src = FsPath::from("gs://bench/src");
    let dst = FsPath::from("gs://bench/dst");
    let invocations = [
        OperationInvocation::create(&src, &CreateOptions::default()),
        OperationInvocation::rename(&src, &dst),
        OperationInvocation::copy_from_local(false, true, &src, &dst, Some(1024)),
    ];

    let mut group = c.benchmark_group("derive_parameters");
    for invocation in &invocations {
        group.bench_with_input(
            BenchmarkId::from_parameter(invocation.kind()),
            invocation,
            |b, invocation| b.iter(|| derive_parameters(black_box(invocation)).unwrap()),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_get_file_status, bench_derive_parameters);
criterion_main!(benches);
