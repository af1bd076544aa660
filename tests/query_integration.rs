//! Integration tests for rollup-aware query planning and stitching
//!
//! These tests drive the public engine API end to end:
//! - Raw, grouped and downsampled queries before and after rollup maintenance
//! - Stitched results matching the raw-only path exactly
//! - Request validation before any store access
//! - Store failures surfacing unchanged

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kuba_rollup::aggregation::{AggregationLevel, AggregationMode, Reducer};
use kuba_rollup::engine::{
    AggregationSwitch, MemoryRollupStore, MemorySampleStore, RollupStore, RowStream, SampleStore,
};
use kuba_rollup::error::StoreError;
use kuba_rollup::query::{QueryEngine, QueryRequest, QueryResult, Strategy};
use kuba_rollup::types::{ChannelId, ClientHint, RollupRow, Sample, ScanRange, Tuple};
use kuba_rollup::{Config, Error};

// ============================================================================
// Helper Functions
// ============================================================================

const HOUR: i64 = 3_600_000;
const DAY: i64 = 24 * HOUR;

/// "Today" 0:00 UTC
const TODAY: i64 = 13 * DAY;

/// Wall clock used for maintenance runs
const NOW: i64 = TODAY + 18 * HOUR;

const CHANNEL: ChannelId = 7;

fn days_ago(days: i64, hours: i64) -> i64 {
    TODAY - days * DAY + hours * HOUR
}

type Engine = QueryEngine<Arc<MemorySampleStore>, Arc<MemoryRollupStore>>;

/// Six samples: one 3 days ago, two each 2 and 1 days ago, one today
fn create_channel() -> (Arc<MemorySampleStore>, Arc<MemoryRollupStore>) {
    let samples = Arc::new(MemorySampleStore::new());
    samples.insert(CHANNEL, days_ago(0, 0), 50.0);
    samples.insert(CHANNEL, days_ago(1, 0), 100.0);
    samples.insert(CHANNEL, days_ago(1, 12), 100.0);
    samples.insert(CHANNEL, days_ago(2, 0), 100.0);
    samples.insert(CHANNEL, days_ago(2, 12), 100.0);
    samples.insert(CHANNEL, days_ago(3, 0), 50.0);
    (samples, Arc::new(MemoryRollupStore::new()))
}

fn create_engine(samples: &Arc<MemorySampleStore>, rollups: &Arc<MemoryRollupStore>) -> Engine {
    Config::default().monitoring.init_logging();
    QueryEngine::new(samples.clone(), rollups.clone(), &Config::default())
        .expect("Failed to create engine")
}

/// Engine over the same stores that never reads rollup rows
fn create_raw_engine(
    samples: &Arc<MemorySampleStore>,
    rollups: &Arc<MemoryRollupStore>,
) -> Engine {
    let switch: Arc<dyn AggregationSwitch> = Arc::new(false);
    create_engine(samples, rollups).with_switch(switch)
}

/// Daily rollups for the two complete days inside a 2 period lookback
fn aggregate_days(engine: &Engine) -> usize {
    engine
        .rollup_aggregator()
        .aggregate_channel(
            CHANNEL,
            AggregationLevel::Day,
            Reducer::Sum,
            AggregationMode::Delta,
            2,
            NOW,
        )
        .expect("Failed to aggregate")
}

fn run(engine: &Engine, request: &QueryRequest) -> QueryResult {
    engine
        .plan_and_execute(request)
        .expect("Query failed")
        .collect()
        .expect("Failed to drain tuples")
}

fn grouped_by_day(from: i64) -> QueryRequest {
    QueryRequest::new(CHANNEL)
        .from(from)
        .group_by("day")
        .client(ClientHint::Raw)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_raw_and_grouped_baseline() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);

    let raw = run(
        &engine,
        &QueryRequest::new(CHANNEL)
            .from(days_ago(3, 0))
            .client(ClientHint::Raw),
    );
    assert_eq!(raw.row_count, 6);
    assert_eq!(raw.tuples.len(), 6);
    assert_eq!(raw.strategy, Strategy::Raw);

    let grouped = run(&engine, &grouped_by_day(days_ago(3, 0)));
    assert_eq!(grouped.row_count, 4);
    assert_eq!(grouped.tuples.len(), 4);

    let today = grouped.tuples.last().unwrap();
    assert_eq!(today.count, 1);
    assert_eq!(today.timestamp, TODAY);
    assert_eq!(today.value, 50.0);
}

#[test]
fn test_delta_aggregation_with_lookback() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);

    // Only today's sample: its bucket is still open
    let fresh = Arc::new(MemorySampleStore::new());
    fresh.insert(CHANNEL, TODAY, 50.0);
    let fresh_engine = create_engine(&fresh, &rollups);
    assert_eq!(aggregate_days(&fresh_engine), 0);
    assert_eq!(rollups.total_rows(), 0);

    assert_eq!(aggregate_days(&engine), 2);
    let starts: Vec<i64> = rollups
        .rows(CHANNEL, AggregationLevel::Day)
        .iter()
        .map(RollupRow::bucket_start)
        .collect();
    assert_eq!(starts, vec![days_ago(2, 0), days_ago(1, 0)]);

    // Re-running picks up nothing new; 3 days ago stays outside the lookback
    assert_eq!(aggregate_days(&engine), 0);
    assert_eq!(rollups.len(CHANNEL, AggregationLevel::Day), 2);
}

#[test]
fn test_delta_aggregation_second_channel() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);
    aggregate_days(&engine);

    samples.insert(CHANNEL + 1, days_ago(1, 0), 100.0);
    let written = engine
        .rollup_aggregator()
        .aggregate_channel(
            CHANNEL + 1,
            AggregationLevel::Day,
            Reducer::Sum,
            AggregationMode::Delta,
            2,
            NOW,
        )
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(rollups.len(CHANNEL + 1, AggregationLevel::Day), 1);
}

#[test]
fn test_stitched_grouping_matches_baseline() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);

    let request = grouped_by_day(days_ago(3, 0)).to(days_ago(0, 18));
    let baseline = run(&engine, &request);
    assert_eq!(baseline.strategy, Strategy::Raw);

    aggregate_days(&engine);

    let plan = engine.plan(&request).unwrap();
    assert_eq!(plan.strategy, Strategy::Grouped);
    assert_eq!(plan.rollup_level, Some(AggregationLevel::Day));
    assert_eq!(plan.tiers.len(), 3);

    let stitched = run(&engine, &request);
    assert_eq!(stitched.strategy, Strategy::Grouped);
    assert_eq!(stitched.row_count, 4);
    assert_eq!(stitched.tuples, baseline.tuples);
}

#[test]
fn test_aggregate_retrieval_from() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);
    aggregate_days(&engine);

    // data; agg + data; agg + agg + data; data + agg + agg + data
    for (days, expected) in [(0, 1), (1, 2), (2, 3), (3, 4)] {
        let result = run(&engine, &grouped_by_day(days_ago(days, 0)));
        assert_eq!(result.row_count, expected, "from {} days ago", days);
        assert_eq!(result.tuples.len() as u64, expected);
    }
}

#[test]
fn test_aggregate_retrieval_to() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);
    aggregate_days(&engine);

    let cases = [
        (days_ago(0, 18), 4),
        (days_ago(1, 6), 3),
        (days_ago(2, 6), 2),
        (days_ago(3, 18), 1),
    ];
    for (to, expected) in cases {
        let result = run(&engine, &grouped_by_day(days_ago(3, 0)).to(to));
        assert_eq!(result.row_count, expected, "to {}", to);
        assert_eq!(result.tuples.len() as u64, expected);
    }
}

#[test]
fn test_single_tuple_covers_whole_range() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);
    aggregate_days(&engine);

    let request = QueryRequest::new(CHANNEL)
        .from(days_ago(3, 0))
        .to(days_ago(0, 18))
        .tuple_count(1)
        .client(ClientHint::Raw);

    let plan = engine.plan(&request).unwrap();
    assert_eq!(plan.strategy, Strategy::Counted);
    // The first rollup bucket is shifted into the raw tier
    assert_eq!(plan.boundary.rollup_from, Some(days_ago(1, 0)));

    let result = run(&engine, &request);
    assert_eq!(result.row_count, 1);
    assert_eq!(result.tuples.len(), 1);

    let full_scan: Vec<Sample> = samples
        .scan(CHANNEL, &ScanRange::closed(Some(days_ago(3, 0)), Some(days_ago(0, 18))))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let tuple = result.tuples[0];
    assert_eq!(tuple.count, full_scan.len() as u64);
    assert_eq!(tuple.value, full_scan.iter().map(|s| s.value).sum::<f64>());
    assert_eq!(tuple.timestamp, full_scan.last().unwrap().timestamp);
}

// ============================================================================
// Stitching Properties
// ============================================================================

/// One integer-valued sample every 5 hours over days 10..=14
fn create_dense_channel() -> (Arc<MemorySampleStore>, Arc<MemoryRollupStore>, Vec<Sample>) {
    let points: Vec<Sample> = (0..)
        .map(|i| Sample::new(10 * DAY + i * 5 * HOUR, (i % 7) as f64))
        .take_while(|s| s.timestamp < 15 * DAY)
        .collect();
    let samples = Arc::new(MemorySampleStore::new());
    samples.extend(CHANNEL, points.iter().copied());
    (samples, Arc::new(MemoryRollupStore::new()), points)
}

fn expected_count(points: &[Sample], from: i64, to: i64) -> u64 {
    points
        .iter()
        .filter(|s| s.timestamp >= from && s.timestamp <= to)
        .count() as u64
}

#[test]
fn test_no_double_count_over_subranges() {
    let (samples, rollups, points) = create_dense_channel();
    let engine = create_engine(&samples, &rollups);

    // Roll up days 11 and 12 only
    let written = engine
        .rollup_aggregator()
        .aggregate_channel(
            CHANNEL,
            AggregationLevel::Day,
            Reducer::Sum,
            AggregationMode::Delta,
            2,
            13 * DAY + HOUR,
        )
        .unwrap();
    assert_eq!(written, 2);

    let offsets: Vec<i64> = (0..=20).map(|i| 10 * DAY + i * 6 * HOUR + 7 * 60_000).collect();
    for (i, &from) in offsets.iter().enumerate() {
        for &to in &offsets[i..] {
            let expected = expected_count(&points, from, to);
            let base = QueryRequest::new(CHANNEL)
                .from(from)
                .to(to)
                .client(ClientHint::Raw);

            for request in [
                base.clone().group_by("day"),
                base.clone().group_by("month"),
                base.clone().tuple_count(1),
                base.clone().tuple_count(3),
                base.clone().tuple_count(1000),
            ] {
                let result = run(&engine, &request);
                assert_eq!(result.row_count, result.tuples.len() as u64, "{:?}", request);
                assert_eq!(
                    result.sample_count(),
                    expected,
                    "range [{}, {}] request {:?}",
                    from,
                    to,
                    request
                );
            }
        }
    }
}

#[test]
fn test_grouped_union_matches_raw_path() {
    let (samples, rollups, _) = create_dense_channel();
    let engine = create_engine(&samples, &rollups);
    let raw_engine = create_raw_engine(&samples, &rollups);

    engine
        .rollup_aggregator()
        .aggregate_channel(
            CHANNEL,
            AggregationLevel::Hour,
            Reducer::Sum,
            AggregationMode::Full,
            0,
            14 * DAY,
        )
        .unwrap();

    for (from, to) in [
        (10 * DAY, 15 * DAY),
        (10 * DAY + 3 * HOUR + 1, 13 * DAY + 17 * HOUR),
        (12 * DAY + 30 * 60_000, 14 * DAY + 12 * HOUR),
    ] {
        for group in ["hour", "day", "month"] {
            let request = QueryRequest::new(CHANNEL)
                .from(from)
                .to(to)
                .group_by(group)
                .client(ClientHint::Raw);

            let stitched = run(&engine, &request);
            let raw = run(&raw_engine, &request);
            assert_eq!(stitched.strategy, Strategy::Grouped);
            assert_eq!(raw.strategy, Strategy::Raw);
            assert_eq!(stitched.row_count, raw.row_count);
            assert_eq!(stitched.tuples, raw.tuples, "group {} [{}, {}]", group, from, to);
        }
    }
}

#[test]
fn test_force_slow_bypasses_rollups() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);
    aggregate_days(&engine);

    let request = grouped_by_day(days_ago(3, 0)).client(ClientHint::ForceSlow);
    let plan = engine.plan(&request).unwrap();
    assert_eq!(plan.strategy, Strategy::Raw);
    assert!(!plan.uses_rollups());
    assert_eq!(run(&engine, &request).row_count, 4);
}

#[test]
fn test_repeated_delta_runs_leave_no_gap() {
    // Two samples a day on days 1..=10
    let samples = Arc::new(MemorySampleStore::new());
    for day in 1..=10 {
        samples.insert(CHANNEL, day * DAY + 6 * HOUR, 1.0);
        samples.insert(CHANNEL, day * DAY + 18 * HOUR, 1.0);
    }
    let rollups = Arc::new(MemoryRollupStore::new());
    let engine = create_engine(&samples, &rollups);
    let raw_engine = create_raw_engine(&samples, &rollups);

    let aggregate = |now: i64| {
        engine
            .rollup_aggregator()
            .aggregate_channel(
                CHANNEL,
                AggregationLevel::Day,
                Reducer::Sum,
                AggregationMode::Delta,
                2,
                now,
            )
            .unwrap()
    };
    assert_eq!(aggregate(4 * DAY), 2);
    // Days 4..=9, not only the last two
    assert_eq!(aggregate(10 * DAY), 6);

    let starts: Vec<i64> = rollups
        .rows(CHANNEL, AggregationLevel::Day)
        .iter()
        .map(RollupRow::bucket_start)
        .collect();
    assert_eq!(starts, (2..=9).map(|day| day * DAY).collect::<Vec<_>>());

    let request = QueryRequest::new(CHANNEL)
        .from(DAY)
        .to(11 * DAY)
        .group_by("day")
        .client(ClientHint::Raw);
    let stitched = run(&engine, &request);
    let raw = run(&raw_engine, &request);
    assert_eq!(stitched.strategy, Strategy::Grouped);
    assert_eq!(stitched.sample_count(), 20);
    assert_eq!(stitched.tuples, raw.tuples);
}

#[test]
fn test_open_range_reports_data_extent() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);
    aggregate_days(&engine);

    for request in [
        QueryRequest::new(CHANNEL).client(ClientHint::Raw),
        QueryRequest::new(CHANNEL).group_by("day").client(ClientHint::Raw),
        QueryRequest::new(CHANNEL).tuple_count(2).client(ClientHint::Raw),
    ] {
        let result = run(&engine, &request);
        assert_eq!(result.range_from, Some(days_ago(3, 0)), "{:?}", request);
        assert_eq!(result.range_to, Some(days_ago(0, 0)), "{:?}", request);
        assert_eq!(result.row_count, result.tuples.len() as u64, "{:?}", request);
    }

    let result = run(
        &engine,
        &QueryRequest::new(CHANNEL)
            .from(days_ago(2, 6))
            .client(ClientHint::Raw),
    );
    assert_eq!(result.range_from, Some(days_ago(2, 12)));
    assert_eq!(result.range_to, Some(days_ago(0, 0)));
}

#[test]
fn test_empty_range() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);

    let output = engine
        .plan_and_execute(
            &QueryRequest::new(CHANNEL)
                .from(days_ago(10, 0))
                .to(days_ago(9, 0))
                .client(ClientHint::Raw),
        )
        .unwrap();
    assert!(output.is_empty());
    assert_eq!(output.range_from, None);
    assert_eq!(output.range_to, None);
    assert!(output.collect().unwrap().tuples.is_empty());
}

#[test]
fn test_result_json() {
    let (samples, rollups) = create_channel();
    let engine = create_engine(&samples, &rollups);
    let result = run(&engine, &grouped_by_day(days_ago(3, 0)));

    let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
    assert_eq!(json["row_count"], 4);
    assert_eq!(json["strategy"], "raw");
    assert_eq!(json["tuples"].as_array().unwrap().len(), 4);
    assert_eq!(json["max"]["value"], 200.0);
}

// ============================================================================
// Validation and Failures
// ============================================================================

/// Store that fails every call and counts how often it was asked
#[derive(Default)]
struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Timeout("store unavailable".to_string()))
    }
}

impl SampleStore for FailingStore {
    fn count(&self, _: ChannelId, _: &ScanRange) -> Result<u64, StoreError> {
        self.fail()
    }

    fn scan(&self, _: ChannelId, _: &ScanRange) -> Result<RowStream<'_, Sample>, StoreError> {
        self.fail()
    }

    fn nearest_before(&self, _: ChannelId, _: i64) -> Result<Option<Sample>, StoreError> {
        self.fail()
    }

    fn nearest_after(&self, _: ChannelId, _: i64) -> Result<Option<Sample>, StoreError> {
        self.fail()
    }
}

impl RollupStore for FailingStore {
    fn row_counts_by_level(
        &self,
        _: ChannelId,
        _: Option<AggregationLevel>,
    ) -> Result<Vec<(AggregationLevel, u64)>, StoreError> {
        self.fail()
    }

    fn first_at_or_after(
        &self,
        _: ChannelId,
        _: AggregationLevel,
        _: Option<i64>,
    ) -> Result<Option<RollupRow>, StoreError> {
        self.fail()
    }

    fn last_before(
        &self,
        _: ChannelId,
        _: AggregationLevel,
        _: Option<i64>,
    ) -> Result<Option<RollupRow>, StoreError> {
        self.fail()
    }

    fn scan(
        &self,
        _: ChannelId,
        _: AggregationLevel,
        _: &ScanRange,
    ) -> Result<RowStream<'_, RollupRow>, StoreError> {
        self.fail()
    }
}

fn failing_engine() -> (Arc<FailingStore>, QueryEngine<Arc<FailingStore>, Arc<FailingStore>>) {
    let store = Arc::new(FailingStore::default());
    let engine = QueryEngine::new(store.clone(), store.clone(), &Config::default()).unwrap();
    (store, engine)
}

#[test]
fn test_validation_before_store_access() {
    let (store, engine) = failing_engine();

    let invalid_range = engine.plan_and_execute(&QueryRequest::new(1).from(20).to(10));
    assert!(matches!(invalid_range, Err(Error::InvalidRange { from: 20, to: 10 })));

    let unknown = engine.plan_and_execute(&QueryRequest::new(1).group_by("fortnight"));
    assert!(matches!(unknown, Err(Error::UnknownGrouping(ref g)) if g == "fortnight"));

    let week = engine.plan_and_execute(&QueryRequest::new(1).group_by("week"));
    assert!(matches!(week, Err(Error::UnsupportedLevel(_))));

    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_store_errors_propagate() {
    let (store, engine) = failing_engine();

    let result = engine.plan_and_execute(&QueryRequest::new(1).from(0).to(10));
    match result {
        Err(Error::Store(StoreError::Timeout(message))) => {
            assert_eq!(message, "store unavailable");
        }
        other => panic!("expected store error, got {:?}", other.map(|o| o.row_count)),
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);

    let grouped = engine.plan_and_execute(&QueryRequest::new(1).group_by("day"));
    assert!(matches!(grouped, Err(Error::Store(_))));
}

#[test]
fn test_stream_error_surfaces_once() {
    /// Sample store whose scans fail after the first row
    struct BrokenScan(MemorySampleStore);

    impl SampleStore for BrokenScan {
        fn count(&self, channel: ChannelId, range: &ScanRange) -> Result<u64, StoreError> {
            self.0.count(channel, range)
        }

        fn scan(
            &self,
            channel: ChannelId,
            range: &ScanRange,
        ) -> Result<RowStream<'_, Sample>, StoreError> {
            let first = self.0.scan(channel, range)?.take(1);
            let broken = std::iter::once(Err(StoreError::Backend("cursor lost".to_string())));
            Ok(Box::new(first.chain(broken)))
        }

        fn nearest_before(&self, channel: ChannelId, t: i64) -> Result<Option<Sample>, StoreError> {
            self.0.nearest_before(channel, t)
        }

        fn nearest_after(&self, channel: ChannelId, t: i64) -> Result<Option<Sample>, StoreError> {
            self.0.nearest_after(channel, t)
        }
    }

    let inner = MemorySampleStore::new();
    for ts in 0..5 {
        inner.insert(1, ts * 1000, 1.0);
    }
    let engine =
        QueryEngine::new(BrokenScan(inner), MemoryRollupStore::new(), &Config::default()).unwrap();
    let mut output = engine
        .plan_and_execute(&QueryRequest::new(1).client(ClientHint::Raw))
        .unwrap();
    assert_eq!(output.row_count, 5);

    let first: Tuple = output.tuples.next().unwrap().unwrap();
    assert_eq!(first, Tuple::new(0, 1.0, 1));
    assert!(matches!(output.tuples.next(), Some(Err(Error::Store(_)))));
    assert!(output.tuples.next().is_none());
}
