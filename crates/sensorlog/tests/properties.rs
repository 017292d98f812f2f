//! Property tests for the batch engine against an in-memory ledger.

use proptest::prelude::*;
use sensorlog::core::{AggregateFunction, RunningStats, SeqRange};
use sensorlog::{AggregatorConfig, BatchAggregator, Error, Granularity, WindowSpec, WindowTable};
use sensorlog_testkit::generators::values;
use sensorlog_testkit::Deployment;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Publish `values`, aggregate `range`, return the outcome and the batch fold of `values`.
fn aggregate_published(
    values: &[i64],
    range: SeqRange,
) -> (sensorlog::Result<sensorlog::AggregateReport>, RunningStats) {
    runtime().block_on(async {
        let mut deployment = Deployment::new(1).await.unwrap();
        deployment.publish_values(0, values).await.unwrap();
        let windows = WindowTable::new([WindowSpec::raw(
            Granularity::FiveMinutes,
            Deployment::reporter(1),
        )])
        .unwrap();
        let engine = BatchAggregator::new(
            deployment.ledger.clone(),
            deployment.collector.clone(),
            windows,
            AggregatorConfig::default(),
        );
        let report = engine
            .aggregate(
                &deployment.sensor(0),
                range,
                Granularity::FiveMinutes,
                &CancellationToken::new(),
            )
            .await;
        let expected = RunningStats::from_values(values.iter().copied())
            .unwrap()
            .unwrap();
        (report, expected)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn aggregates_are_bounded_and_match_the_fold(values in values(40)) {
        let range = SeqRange::new(0, values.len() as u64);
        let (report, expected) = aggregate_published(&values, range);
        let report = report.unwrap();

        let avg = report.value(AggregateFunction::Avg).unwrap();
        let min = report.value(AggregateFunction::Min).unwrap();
        let max = report.value(AggregateFunction::Max).unwrap();
        prop_assert!(min <= avg && avg <= max);
        prop_assert!(values.iter().all(|v| min <= *v && *v <= max));
        prop_assert_eq!(report.count, values.len() as u64);
        prop_assert_eq!((avg, min, max), (expected.avg(), expected.min, expected.max));
        prop_assert_eq!(report.range, range);
    }

    #[test]
    fn ranges_past_the_log_find_nothing(values in values(10), gap in 0u64..5, len in 1u64..8) {
        let start = values.len() as u64 + gap;
        let (report, _) = aggregate_published(&values, SeqRange::with_len(start, len));
        prop_assert!(matches!(report, Err(Error::NoRecordsFound(_))));
    }
}
