//! Benchmarks for query classification.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use sinkhole::dns::Classifier;
use sinkhole::lists::Lists;

fn generate_lists(size: usize) -> Lists {
    let blocklist: Vec<String> = (0..size).map(|i| format!("blocked{i}.example.com")).collect();
    let whitelist: Vec<String> = (0..size / 10).map(|i| format!("allowed{i}.example.org")).collect();
    let keywords = ["doubleclick", "telemetry", "adserver"];
    Lists::new(&blocklist, &whitelist, keywords)
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    let classifier = Classifier::default();

    for size in &[10, 100, 1000, 10000] {
        let lists = generate_lists(*size);

        // Subdomain of the first blocklist entry
        group.bench_with_input(BenchmarkId::new("blocklist_hit", size), &lists, |b, lists| {
            b.iter(|| classifier.classify(black_box("cdn.blocked0.example.com"), lists));
        });

        group.bench_with_input(BenchmarkId::new("keyword_hit", size), &lists, |b, lists| {
            b.iter(|| classifier.classify(black_box("metrics.telemetry.example.net"), lists));
        });

        // Worst case: every list is scanned in full
        group.bench_with_input(BenchmarkId::new("miss", size), &lists, |b, lists| {
            b.iter(|| classifier.classify(black_box("www.rust-lang.org"), lists));
        });
    }

    group.finish();
}

fn bench_list_build(c: &mut Criterion) {
    let entries: Vec<String> = (0..10_000).map(|i| format!("Blocked{i}.Example.com.")).collect();

    c.bench_function("lists_new_10000", |b| {
        b.iter(|| Lists::new(black_box(&entries), [""; 0], [""; 0]));
    });
}

criterion_group!(benches, bench_classify, bench_list_build);
criterion_main!(benches);
