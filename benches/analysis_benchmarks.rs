//! Benchmarks for the analysis tick.

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use perf_telemetry::analysis::stats::Descriptive;
use perf_telemetry::config::{AnalysisConfig, MonitorConfig};
use perf_telemetry::engine::PerformanceAnalyzer;
use perf_telemetry::monitor::RealTimeMonitor;
use perf_telemetry::sources::{collect_all, SimulatedSource};

fn warmed_analyzer(ticks: u64) -> PerformanceAnalyzer {
    let sources = SimulatedSource::standard_set(Some(42));
    let mut analyzer = PerformanceAnalyzer::new(AnalysisConfig {
        calibration_target: 20,
        ..AnalysisConfig::default()
    })
    .expect("valid config");
    for i in 0..ticks {
        let collected = collect_all(&sources, i * 1_000);
        analyzer.analyze(i * 1_000, &collected.snapshot).expect("tick");
    }
    analyzer
}

fn bench_analyze_tick(c: &mut Criterion) {
    let sources = SimulatedSource::standard_set(Some(7));
    let snapshot = collect_all(&sources, 500_000).snapshot;

    c.bench_function("analyze_tick_warm", |b| {
        b.iter_batched(
            || warmed_analyzer(300),
            |mut analyzer| {
                black_box(analyzer.analyze(500_000, &snapshot).expect("tick"));
            },
            BatchSize::LargeInput,
        );
    });

    let analyzer = warmed_analyzer(300);
    c.bench_function("analysis_results", |b| {
        b.iter(|| black_box(analyzer.analysis_results()));
    });
}

fn bench_descriptive(c: &mut Criterion) {
    let values: Vec<f64> = (0..1_000).map(|i| f64::from(i % 97) * 1.5).collect();
    c.bench_function("descriptive_1000", |b| {
        b.iter(|| black_box(Descriptive::from_values(black_box(&values))));
    });
}

fn bench_monitor_tick(c: &mut Criterion) {
    let mut monitor = RealTimeMonitor::new(MonitorConfig::default()).expect("valid config");
    for source in SimulatedSource::standard_set(Some(3)) {
        monitor.add_source(source);
    }
    let mut now = 0;
    c.bench_function("monitor_tick", |b| {
        b.iter(|| {
            now += 1_000;
            black_box(monitor.tick(now))
        });
    });
}

criterion_group!(
    benches,
    bench_analyze_tick,
    bench_descriptive,
    bench_monitor_tick
);
criterion_main!(benches);
