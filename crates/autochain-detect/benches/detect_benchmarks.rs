//! Benchmarks for content-based context detection.
//!
//! The monitoring loop may scan a full terminal pane on every tick, so the
//! pattern library has to stay cheap on captures of a few hundred lines.

use std::time::Duration;

use autochain_detect::{ContextDetector, PatternSet};
use criterion::{criterion_group, criterion_main, Criterion};

/// Generate a realistic terminal capture of `lines` lines.
///
/// Roughly one line in twenty carries a recognisable event.
fn generate_capture(lines: usize) -> String {
    let mut capture = String::new();
    for i in 0..lines {
        let line = match i % 20 {
            3 => format!("FAILED tests/test_api.py::test_case_{} - AssertionError", i),
            9 => "npm ERR! build failed with exit code 1".to_string(),
            14 => format!("[main {:07x}] fix: handle empty payload, 1 commit", i),
            _ => format!(
                "  compiling module_{} ... ok ({} ms) -- cache hit ratio {}%",
                i,
                i * 7 % 300,
                i % 100
            ),
        };
        capture.push_str(&line);
        capture.push('\n');
    }
    capture
}

fn bench_pattern_set(c: &mut Criterion) {
    let set = PatternSet::new();
    let small = generate_capture(50);
    let large = generate_capture(500);

    let mut group = c.benchmark_group("pattern_set");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("capture_50_lines", |b| b.iter(|| set.detect(&small)));
    group.bench_function("capture_500_lines", |b| b.iter(|| set.detect(&large)));

    group.finish();
}

fn bench_detect_from_content(c: &mut Criterion) {
    let detector = ContextDetector::new(".");
    let capture = generate_capture(200);

    let mut group = c.benchmark_group("detect_from_content");
    group.sample_size(100);

    group.bench_function("capture_200_lines", |b| {
        b.iter(|| detector.detect_from_content(&capture, Some("bench")))
    });

    group.finish();
}

criterion_group!(benches, bench_pattern_set, bench_detect_from_content);
criterion_main!(benches);
