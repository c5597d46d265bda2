//! Benchmarks for the Python sandbox.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use restricted_python_sandbox_rs::prelude::*;
use restricted_python_sandbox_rs::sandbox::analyzer::analyze;
use restricted_python_sandbox_rs::syntax::parse_program;
use tokio::runtime::Runtime;

const SAMPLE_PROGRAM: &str = "\
import math
values = [math.sqrt(i) for i in range(100)]
evens = {i: i * i for i in range(50) if i % 2 == 0}
total = 0
for v in values:
    total += v
result = f'{total:.3f} {len(evens)}'
";

/// A program of `lines` independent assignments.
fn program_of(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("x{i} = [{i} * k for k in range(10) if k % 3] + [str({i})]\n"))
        .collect()
}

fn sandbox() -> PythonSandbox {
    let config = SandboxConfig::builder()
        .worker_path(env!("CARGO_BIN_EXE_sandbox-worker"))
        .build()
        .unwrap();
    PythonSandbox::new(config).unwrap()
}

/// Benchmark parsing alone.
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for lines in [10, 100, 1000] {
        let source = program_of(lines);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &source, |b, source| {
            b.iter(|| parse_program(black_box(source)).unwrap());
        });
    }
    group.finish();
}

/// Benchmark parse plus security analysis.
fn bench_analyze(c: &mut Criterion) {
    let allow_list = AllowList::default();
    let mut group = c.benchmark_group("analyze");
    for lines in [10, 100, 1000] {
        let source = program_of(lines);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &source, |b, source| {
            b.iter(|| analyze(black_box(source), &allow_list).unwrap());
        });
    }

    let hostile = "import os\nx = ().__class__.__bases__\neval('1')\n".repeat(100);
    group.bench_function("rejected_300_violations", |b| {
        b.iter(|| analyze(black_box(&hostile), &allow_list).unwrap_err());
    });
    group.finish();
}

/// Benchmark a full execution including the worker process round trip.
fn bench_execute(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let sandbox = sandbox();

    let mut group = c.benchmark_group("execute");
    group.sample_size(20);

    group.bench_function("simple_expression", |b| {
        b.iter(|| rt.block_on(sandbox.execute_source(black_box("result = 2 + 2"))));
    });

    group.bench_function("sample_program", |b| {
        b.iter(|| rt.block_on(sandbox.execute_source(black_box(SAMPLE_PROGRAM))));
    });

    group.bench_function("rejected_before_spawn", |b| {
        b.iter(|| rt.block_on(sandbox.execute_source(black_box("import os"))));
    });

    group.finish();
}

/// Benchmark concurrent executions.
fn bench_concurrent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let sandbox = std::sync::Arc::new(sandbox());

    let mut group = c.benchmark_group("concurrent");
    group.sample_size(10);

    for concurrency in [1, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &n| {
                b.iter(|| {
                    let sandbox = sandbox.clone();
                    rt.block_on(async move {
                        let handles: Vec<_> = (0..n)
                            .map(|i| {
                                let sandbox = sandbox.clone();
                                tokio::spawn(async move {
                                    sandbox
                                        .execute_source(&format!("result = {i} * 2"))
                                        .await
                                })
                            })
                            .collect();
                        for handle in handles {
                            black_box(handle.await.unwrap());
                        }
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_analyze, bench_execute, bench_concurrent);
criterion_main!(benches);
