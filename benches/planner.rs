use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kuba_rollup::aggregation::{AggregationLevel, AggregationMode, Reducer};
use kuba_rollup::engine::{MemoryRollupStore, MemorySampleStore};
use kuba_rollup::error::StoreError;
use kuba_rollup::query::operators::{downsample, group_by_level, PackageSpec};
use kuba_rollup::query::{QueryEngine, QueryRequest};
use kuba_rollup::types::{ClientHint, Tuple};
use kuba_rollup::Config;

const DAY: i64 = 86_400_000;

fn create_tuples(count: usize) -> Vec<Tuple> {
    (0..count)
        .map(|i| Tuple::new(1_000 + i as i64 * 10_000, 100.0 + (i % 50) as f64, 1))
        .collect()
}

fn stream(tuples: &[Tuple]) -> impl Iterator<Item = Result<Tuple, StoreError>> + '_ {
    tuples.iter().copied().map(Ok)
}

fn bench_group_by_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_by_level");

    for size in [1_000, 10_000, 100_000].iter() {
        let tuples = create_tuples(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let grouped = group_by_level(stream(&tuples), AggregationLevel::Hour, Reducer::Sum);
                black_box(grouped.count())
            });
        });
    }

    group.finish();
}

fn bench_downsample(c: &mut Criterion) {
    let mut group = c.benchmark_group("downsample");

    for size in [1_000, 10_000, 100_000].iter() {
        let tuples = create_tuples(*size);
        let spec = PackageSpec::for_target(*size as u64, 200).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(downsample(stream(&tuples), spec, Reducer::Max).count()));
        });
    }

    group.finish();
}

fn bench_stitched_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("stitched_query");

    // One sample per minute over 30 days, 28 of them rolled up
    let samples = MemorySampleStore::new();
    for i in 0..(30 * 24 * 60) {
        samples.insert(1, i * 60_000, (i % 17) as f64);
    }
    let engine = QueryEngine::new(samples, MemoryRollupStore::new(), &Config::default()).unwrap();
    engine
        .rollup_aggregator()
        .aggregate_channel(1, AggregationLevel::Day, Reducer::Sum, AggregationMode::Full, 0, 28 * DAY)
        .unwrap();

    let requests = [
        ("grouped_day", QueryRequest::new(1).to(30 * DAY).group_by("day")),
        ("counted_300", QueryRequest::new(1).to(30 * DAY).tuple_count(300)),
        ("raw_day", QueryRequest::new(1).from(29 * DAY).to(30 * DAY)),
    ];

    for (name, request) in requests {
        let request = request.client(ClientHint::Raw);
        group.bench_function(name, |b| {
            b.iter(|| {
                let result = engine.plan_and_execute(&request).unwrap().collect().unwrap();
                black_box(result.row_count)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_group_by_level, bench_downsample, bench_stitched_query);
criterion_main!(benches);
