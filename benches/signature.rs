//! Benchmarks for signature building and candidate search.
//!
//! Benchmark targets:
//! - Building a 32-permutation signature from a short message
//! - Band key derivation
//! - Classify against an in-memory index of 1000 items

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use simidx::storage::MemoryStore;
use simidx::{Banding, Feature, IndexConfig, MinHashIndex, MinHashSignatureBuilder};

const SHORT_TEXT: &str = "connection reset by peer";
const LONG_TEXT: &str = "Traceback (most recent call last): File \"app/handlers.py\", \
    line 42, in handle_request response = upstream.fetch(url, timeout=30) \
    ConnectionResetError: [Errno 104] Connection reset by peer";

fn frames(count: usize) -> Feature {
    Feature::tokens((0..count).map(|i| format!("module_{}::function_{}", i % 17, i)))
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature_build");
    group.measurement_time(Duration::from_secs(5));
    let builder = MinHashSignatureBuilder::new(32, 0xFFFF).unwrap();

    group.bench_function("short_text", |b| {
        let feature = Feature::text(SHORT_TEXT);
        b.iter(|| builder.build(black_box(&feature)));
    });

    group.bench_function("long_text", |b| {
        let feature = Feature::text(LONG_TEXT);
        b.iter(|| builder.build(black_box(&feature)));
    });

    for count in [10, 100, 1000] {
        let feature = frames(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("tokens", count), &feature, |b, feature| {
            b.iter(|| builder.build(black_box(feature)));
        });
    }

    group.finish();
}

fn bench_band_keys(c: &mut Criterion) {
    let builder = MinHashSignatureBuilder::new(32, 0xFFFF).unwrap();
    let banding = Banding::new(32, 16).unwrap();
    let signature = builder.build(&Feature::text(LONG_TEXT)).unwrap();

    c.bench_function("band_keys", |b| {
        b.iter(|| banding.band_keys(black_box(&signature)));
    });
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.measurement_time(Duration::from_secs(5));

    let index = MinHashIndex::new(IndexConfig::default(), MemoryStore::new()).unwrap();
    for i in 0..1000 {
        let message = format!("{SHORT_TEXT} at host-{}", i % 50);
        index
            .record("bench", &i.to_string(), &[("message", Feature::text(message))])
            .unwrap();
    }

    group.bench_function("1000_items_threshold_0", |b| {
        let query = [("message", 0, Feature::text(format!("{SHORT_TEXT} at host-7")))];
        b.iter(|| index.classify("bench", black_box(&query), Some(10)).unwrap());
    });

    group.bench_function("1000_items_threshold_8", |b| {
        let query = [("message", 8, Feature::text(format!("{SHORT_TEXT} at host-7")))];
        b.iter(|| index.classify("bench", black_box(&query), Some(10)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_band_keys, bench_classify);
criterion_main!(benches);
