//! The streaming aggregation engine.
//!
//! Each plaintext reading is folded into four nested records, one per
//! calendar precision. Range queries re-fold stored records and never touch
//! raw readings.
//!
//! The fold is not idempotent, so every read-modify-write of a subject's
//! records runs under that subject's stripe lock: one writer per key at a
//! time, even when callers share the engine across threads.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use sensorlog_core::{merge_partials, RunningStats};

use crate::bucket::{self, bucket_keys, Precision};
use crate::error::{Result, RollupError};
use crate::record::{AggregateRecord, LatestEvent};
use crate::state::{composite_key, StateStore, KEY_SEPARATOR};

/// Configuration for the rollup engine.
#[derive(Debug, Clone)]
pub struct RollupConfig {
    /// Upper bound on buckets a single range query may enumerate.
    pub max_range_buckets: usize,

    /// Number of subject lock stripes.
    pub lock_stripes: usize,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            max_range_buckets: 100_000,
            lock_stripes: 64,
        }
    }
}

/// Result of a range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSummary {
    pub precision: Precision,

    /// Buckets enumerated, including empty ones.
    pub buckets: usize,

    /// Records found, in bucket order.
    pub records: Vec<AggregateRecord>,

    /// Fold over all found records; `None` when no bucket had data.
    pub stats: Option<RunningStats>,
}

impl RangeSummary {
    /// Number of events folded into the range.
    pub fn count(&self) -> u64 {
        self.stats.map_or(0, |s| s.count)
    }
}

/// Streaming rollups over a [`StateStore`].
pub struct RollupEngine<S: StateStore> {
    store: S,
    config: RollupConfig,
    stripes: Vec<Mutex<()>>,
}

impl<S: StateStore> RollupEngine<S> {
    /// Create an engine with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, RollupConfig::default())
    }

    pub fn with_config(store: S, config: RollupConfig) -> Self {
        let stripes = (0..config.lock_stripes.max(1))
            .map(|_| Mutex::new(()))
            .collect();
        Self {
            store,
            config,
            stripes,
        }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RollupConfig {
        &self.config
    }

    fn lock_subject(&self, subject: &str) -> Result<MutexGuard<'_, ()>> {
        let mut hasher = DefaultHasher::new();
        subject.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index]
            .lock()
            .map_err(|e| RollupError::State(format!("subject lock poisoned: {}", e)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Fold one reading into its four buckets and remember it as the
    /// subject's latest event.
    ///
    /// Returns the updated records, finest first.
    pub fn record(
        &self,
        subject: &str,
        value: i64,
        unit: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<AggregateRecord>> {
        validate_subject(subject)?;
        let _guard = self.lock_subject(subject)?;

        // Fold all four before writing any, so an overflow leaves no partial update.
        let mut updated = Vec::with_capacity(Precision::ALL.len());
        for bucket in bucket_keys(timestamp) {
            let key = composite_key(subject, &bucket);
            let existing = match self.store.get_state(&key)? {
                Some(bytes) => Some(AggregateRecord::from_bytes(&bytes)?),
                None => None,
            };
            updated.push(AggregateRecord::fold(existing, subject, &bucket, value)?);
        }
        for record in &updated {
            self.store
                .put_state(&composite_key(subject, &record.bucket), record.to_bytes()?)?;
        }

        let latest = LatestEvent {
            subject: subject.to_string(),
            creation_time: timestamp,
            value,
            unit: unit.to_string(),
        };
        self.store.put_state(subject, latest.to_bytes()?)?;

        trace!(subject, value, %timestamp, "reading folded");
        Ok(updated)
    }

    /// Like [`record`](Self::record), with an RFC 3339 timestamp.
    pub fn record_rfc3339(
        &self,
        subject: &str,
        value: i64,
        unit: &str,
        timestamp: &str,
    ) -> Result<Vec<AggregateRecord>> {
        let ts = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| RollupError::InvalidTimestamp(format!("{:?}: {}", timestamp, e)))?
            .with_timezone(&Utc);
        self.record(subject, value, unit, ts)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Exact lookup of one `(subject, bucket)` record.
    pub fn get(&self, subject: &str, bucket: &str) -> Result<Option<AggregateRecord>> {
        validate_subject(subject)?;
        Precision::of_key(bucket)?;
        match self.store.get_state(&composite_key(subject, bucket))? {
            Some(bytes) => Ok(Some(AggregateRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The most recent raw event of a subject.
    pub fn last_event(&self, subject: &str) -> Result<Option<LatestEvent>> {
        validate_subject(subject)?;
        match self.store.get_state(subject)? {
            Some(bytes) => Ok(Some(LatestEvent::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Re-fold every record in `[from, to)`.
    ///
    /// `from` and `to` are bucket keys of the same precision.
    pub fn range(&self, subject: &str, from: &str, to: &str) -> Result<RangeSummary> {
        validate_subject(subject)?;
        let (precision, keys) = bucket::enumerate(from, to, self.config.max_range_buckets)?;

        let mut records = Vec::new();
        for key in &keys {
            if let Some(bytes) = self.store.get_state(&composite_key(subject, key))? {
                records.push(AggregateRecord::from_bytes(&bytes)?);
            }
        }
        let stats = merge_partials(records.iter().map(|r| Some(r.stats)))?;

        debug!(
            subject,
            %precision,
            buckets = keys.len(),
            found = records.len(),
            "range folded"
        );
        Ok(RangeSummary {
            precision,
            buckets: keys.len(),
            records,
            stats,
        })
    }

    /// Number of events in `[from, to)`.
    pub fn count_between(&self, subject: &str, from: &str, to: &str) -> Result<u64> {
        Ok(self.range(subject, from, to)?.count())
    }

    /// Number of events from bucket `from` through the bucket containing `now`.
    pub fn count_since(&self, subject: &str, from: &str, now: DateTime<Utc>) -> Result<u64> {
        let precision = Precision::of_key(from)?;
        let current = precision.start_of(&precision.key(now))?;
        let end = precision.next(current).ok_or_else(|| {
            RollupError::RangeArithmeticOverflow(format!("calendar overflow after {}", current))
        })?;
        self.count_between(subject, from, &precision.key(end))
    }
}

fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() || subject.contains(KEY_SEPARATOR) {
        return Err(RollupError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn engine() -> RollupEngine<MemoryStateStore> {
        RollupEngine::new(MemoryStateStore::new())
    }

    #[test]
    fn test_same_minute_fold() {
        let engine = engine();
        let ts = Utc.with_ymd_and_hms(2021, 6, 5, 18, 4, 0).unwrap();
        for v in [600, 610, 620, 630] {
            engine.record("asdf", v, "celsius", ts).unwrap();
        }

        let expected = RunningStats {
            count: 4,
            sum: 2460,
            min: 600,
            max: 630,
        };
        for bucket in bucket_keys(ts) {
            let record = engine.get("asdf", &bucket).unwrap().unwrap();
            assert_eq!(record.stats, expected, "bucket {}", bucket);
        }
    }

    #[test]
    fn test_nested_buckets_diverge() {
        let engine = engine();
        engine
            .record_rfc3339("s1", 10, "celsius", "2021-06-05T18:04:10Z")
            .unwrap();
        engine
            .record_rfc3339("s1", 20, "celsius", "2021-06-05T18:05:10Z")
            .unwrap();
        engine
            .record_rfc3339("s1", 30, "celsius", "2021-06-06T01:00:00Z")
            .unwrap();

        assert_eq!(engine.get("s1", "2021-06-05T18:04").unwrap().unwrap().stats.count, 1);
        assert_eq!(engine.get("s1", "2021-06-05T18").unwrap().unwrap().stats.count, 2);
        assert_eq!(engine.get("s1", "2021-06-05").unwrap().unwrap().stats.count, 2);
        assert_eq!(engine.get("s1", "2021-06").unwrap().unwrap().stats.count, 3);
        assert!(engine.get("s1", "2021-07").unwrap().is_none());
    }

    #[test]
    fn test_record_rfc3339_offset_normalized() {
        let engine = engine();
        let records = engine
            .record_rfc3339("s1", 5, "percent", "2021-06-05T20:04:00+02:00")
            .unwrap();
        assert_eq!(records[0].bucket, "2021-06-05T18:04");

        assert!(matches!(
            engine.record_rfc3339("s1", 5, "percent", "yesterday"),
            Err(RollupError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_last_event() {
        let engine = engine();
        assert!(engine.last_event("s1").unwrap().is_none());
        engine
            .record_rfc3339("s1", 7, "celsius", "2021-06-05T18:04:00Z")
            .unwrap();
        engine
            .record_rfc3339("s1", 9, "celsius", "2021-06-05T18:09:00Z")
            .unwrap();
        let event = engine.last_event("s1").unwrap().unwrap();
        assert_eq!(event.value, 9);
        assert_eq!(event.unit, "celsius");
    }

    #[test]
    fn test_subject_with_separator_rejected() {
        let engine = engine();
        let ts = Utc::now();
        assert!(matches!(
            engine.record("a~b", 1, "celsius", ts),
            Err(RollupError::InvalidSubject(_))
        ));
        assert!(engine.record("", 1, "celsius", ts).is_err());
    }

    #[test]
    fn test_range_over_days() {
        let engine = engine();
        for (day, v) in [(1, 10), (2, 20), (2, 40), (4, 5)] {
            let ts = Utc.with_ymd_and_hms(2021, 6, day, 12, 0, 0).unwrap();
            engine.record("s1", v, "celsius", ts).unwrap();
        }

        let summary = engine.range("s1", "2021-06-01", "2021-06-04").unwrap();
        assert_eq!(summary.precision, Precision::Day);
        assert_eq!(summary.buckets, 3);
        assert_eq!(summary.records.len(), 2);
        let stats = summary.stats.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sum, 70);
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 40);

        assert_eq!(engine.count_between("s1", "2021-06-01", "2021-06-05").unwrap(), 4);
        assert_eq!(engine.count_between("s1", "2021-06-05", "2021-06-09").unwrap(), 0);
    }

    #[test]
    fn test_count_since_includes_current_bucket() {
        let engine = engine();
        for h in [8, 9, 10] {
            let ts = Utc.with_ymd_and_hms(2021, 6, 5, h, 30, 0).unwrap();
            engine.record("s1", 1, "celsius", ts).unwrap();
        }
        let now = Utc.with_ymd_and_hms(2021, 6, 5, 10, 45, 0).unwrap();
        assert_eq!(engine.count_since("s1", "2021-06-05T09", now).unwrap(), 2);
    }

    #[test]
    fn test_range_bound_reported() {
        let engine = RollupEngine::with_config(
            MemoryStateStore::new(),
            RollupConfig {
                max_range_buckets: 10,
                ..RollupConfig::default()
            },
        );
        assert!(matches!(
            engine.range("s1", "2021-06-01", "2021-07-01"),
            Err(RollupError::RangeArithmeticOverflow(_))
        ));
    }

    #[test]
    fn test_overflow_leaves_records_untouched() {
        let engine = engine();
        let ts = Utc.with_ymd_and_hms(2021, 6, 5, 18, 4, 0).unwrap();
        engine.record("s1", i64::MAX, "celsius", ts).unwrap();
        assert!(engine.record("s1", 1, "celsius", ts).is_err());
        let record = engine.get("s1", "2021-06").unwrap().unwrap();
        assert_eq!(record.stats.count, 1);
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let engine = Arc::new(RollupEngine::new(MemoryStateStore::new()));
        let ts = Utc.with_ymd_and_hms(2021, 6, 5, 18, 4, 0).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        engine.record("shared", 2, "celsius", ts).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let record = engine.get("shared", "2021-06-05T18:04").unwrap().unwrap();
        assert_eq!(record.stats.count, 400);
        assert_eq!(record.stats.sum, 800);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn incremental_matches_batch_in_any_order(
                (values, shuffled) in prop::collection::vec(-1_000_000i64..1_000_000, 1..40)
                    .prop_flat_map(|values| (Just(values.clone()), Just(values).prop_shuffle())),
            ) {
                let ts = Utc.with_ymd_and_hms(2021, 6, 5, 18, 4, 0).unwrap();
                let batch = RunningStats::from_values(values.iter().copied()).unwrap().unwrap();

                let engine = engine();
                for v in shuffled {
                    engine.record("p", v, "celsius", ts).unwrap();
                }
                let record = engine.get("p", "2021-06").unwrap().unwrap();
                prop_assert_eq!(record.stats, batch);
            }
        }
    }
}
