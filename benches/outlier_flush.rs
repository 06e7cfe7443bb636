//! Outlier sampling benchmark
//!
//! Measures the sampler's hot path (`add_trace`) and the flush that runs the
//! robust z-score test for every identity.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench outlier_flush
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graphtrace::outlier::{OutlierOptions, OutlierStore};
use graphtrace::trace::TraceRecord;
use graphtrace::trace_store::TraceStore;
use serde_json::Value;

fn bench_trace(name: &str, time: f64) -> TraceRecord {
    TraceRecord {
        name: name.to_string(),
        path: Vec::new(),
        time,
        args: Value::Null,
        source: Value::Null,
        result: Value::Null,
    }
}

/// Candidate replacement for a single identity
fn bench_add_trace(c: &mut Criterion) {
    let mut store = OutlierStore::default();
    let mut i = 0u64;

    c.bench_function("outlier_add_trace", |b| {
        b.iter(|| {
            store.add_trace(black_box(bench_trace("s.T.f", (i % 100) as f64)));
            i += 1;
        });
    });
}

/// Flush against a full archive, by archive size
fn bench_flush_full_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("outlier_flush_archive");

    for archive_size in [10, 30, 100, 300] {
        group.bench_with_input(
            BenchmarkId::from_parameter(archive_size),
            &archive_size,
            |b, &archive_size| {
                let options = OutlierOptions {
                    archive_size,
                    ..OutlierOptions::default()
                };
                let baseline = (0..archive_size).map(|i| 50.0 + (i % 7) as f64);
                let mut store = OutlierStore::with_archive(options, baseline);
                let mut i = 0u64;

                b.iter(|| {
                    store.add_trace(bench_trace("s.T.f", 50.0 + (i % 9) as f64));
                    black_box(store.get_outliers());
                    i += 1;
                });
            },
        );
    }

    group.finish();
}

/// Dispatcher flush across many identities
fn bench_trace_store_flush(c: &mut Criterion) {
    let names: Vec<String> = (0..200).map(|i| format!("s.T.f{}", i)).collect();
    let mut store = TraceStore::new();
    let mut i = 0u64;

    c.bench_function("trace_store_flush_200_identities", |b| {
        b.iter(|| {
            for name in &names {
                store.add_trace(bench_trace(name, (i % 13) as f64));
            }
            black_box(store.get_outliers());
            i += 1;
        });
    });
}

criterion_group!(
    benches,
    bench_add_trace,
    bench_flush_full_archive,
    bench_trace_store_flush
);
criterion_main!(benches);
