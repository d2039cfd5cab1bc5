//! Benchmarks for waveform measurement
//!
//! Full-buffer measurement runs once per channel per capture, so its cost
//! bounds the continuous-mode refresh rate.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pitayascope::analysis::measure::{dominant_frequency, measure_samples};

fn tone(len: usize) -> Vec<f64> {
    (0..len)
        .map(|n| (2.0 * std::f64::consts::PI * 37.3 * n as f64 / len as f64).sin())
        .collect()
}

fn bench_dominant_frequency(c: &mut Criterion) {
    let mut group = c.benchmark_group("dominant_frequency");
    for len in [1024usize, 4096, 16384] {
        let samples = tone(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &samples, |b, s| {
            b.iter(|| dominant_frequency(black_box(s), 125e6))
        });
    }
    group.finish();
}

fn bench_measure_full_buffer(c: &mut Criterion) {
    let samples = tone(16384);
    c.bench_function("measure_16384", |b| {
        b.iter(|| measure_samples(black_box(&samples), 125e6 / 64.0))
    });
}

criterion_group!(benches, bench_dominant_frequency, bench_measure_full_buffer);
criterion_main!(benches);
