//! Read-only queries over the log.
//!
//! Each query locates a sequence or time range, decrypts what it needs and
//! filters or folds the result. Nothing is written. Queries against a
//! window's aggregates decrypt with that window's reporter key and never
//! touch raw entries unless asked to.

use std::collections::BTreeMap;
use std::sync::Arc;

use sensorlog_core::{
    decode, derive_shared_secret, transform, Address, AggregateFunction, CoreError, EntryCategory,
    Identity, LogEntry, RunningStats, SeqRange,
};
use sensorlog_ledger::{EntryQuery, Ledger};
use serde::Serialize;
use tracing::{debug, warn};

use crate::batch::bounded;
use crate::config::{AggregatorConfig, Granularity, WindowTable};
use crate::error::{Error, Result};
use crate::reading::{collect_readings, ReadingSet};

/// A filter on decrypted reading values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuePredicate {
    Gt(i64),
    Ge(i64),
    Lt(i64),
    Le(i64),
    /// Strictly between the two bounds.
    Between(i64, i64),
}

impl ValuePredicate {
    pub fn matches(&self, value: i64) -> bool {
        match *self {
            ValuePredicate::Gt(bound) => value > bound,
            ValuePredicate::Ge(bound) => value >= bound,
            ValuePredicate::Lt(bound) => value < bound,
            ValuePredicate::Le(bound) => value <= bound,
            ValuePredicate::Between(low, high) => value > low && value < high,
        }
    }
}

/// A decrypted aggregate entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateView {
    pub function: AggregateFunction,
    pub value: i64,
    /// Raw sequence range the aggregate covers.
    pub range: SeqRange,
    /// The reporter's sequence number for the entry.
    pub seq: u64,
    pub timestamp: i64,
}

/// Query front end over a ledger.
pub struct Browser<L: Ledger> {
    ledger: Arc<L>,
    collector: Identity,
    windows: WindowTable,
    config: AggregatorConfig,
}

impl<L: Ledger> Browser<L> {
    pub fn new(
        ledger: Arc<L>,
        collector: Identity,
        windows: WindowTable,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            ledger,
            collector,
            windows,
            config,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Raw Readings
    // ─────────────────────────────────────────────────────────────────────────

    /// Readings appended in `(from, to]`.
    pub async fn readings_between(&self, sensor: &Address, from: i64, to: i64) -> Result<ReadingSet> {
        let entries = bounded(
            self.config.ledger_timeout,
            "query_by_time",
            self.ledger.query_by_time(sensor, from, to),
        )
        .await?;
        self.decrypt(sensor, &entries)
    }

    /// Readings in any of several `(from, to]` windows, each once, by sequence.
    pub async fn readings_in_windows(
        &self,
        sensor: &Address,
        windows: &[(i64, i64)],
    ) -> Result<ReadingSet> {
        let mut entries = BTreeMap::new();
        for &(from, to) in windows {
            let found = bounded(
                self.config.ledger_timeout,
                "query_by_time",
                self.ledger.query_by_time(sensor, from, to),
            )
            .await?;
            entries.extend(found.into_iter().map(|e| (e.seq, e)));
        }
        self.decrypt(sensor, entries.values())
    }

    /// Every reading whose value satisfies `predicate`.
    pub async fn readings_where(
        &self,
        sensor: &Address,
        predicate: ValuePredicate,
    ) -> Result<ReadingSet> {
        let query = EntryQuery::from_sender(*sensor).to(self.collector.address());
        let entries = bounded(self.config.ledger_timeout, "query", self.ledger.query(&query)).await?;
        let mut set = self.decrypt(sensor, &entries)?;
        set.readings.retain(|r| predicate.matches(r.value));
        Ok(set)
    }

    /// Truncating mean of the readings appended in `(from, to]`.
    pub async fn average_between(&self, sensor: &Address, from: i64, to: i64) -> Result<i64> {
        let set = self.readings_between(sensor, from, to).await?;
        RunningStats::from_values(set.values())?
            .map(|stats| stats.avg())
            .ok_or_else(|| {
                Error::NoRecordsFound(format!(
                    "sensor {} has no readings in ({}, {}]",
                    sensor, from, to
                ))
            })
    }

    /// Raw reading entries addressed to the collector after `after`.
    ///
    /// Counts entries without decrypting them.
    pub async fn count_after(&self, sensor: &Address, after: i64) -> Result<usize> {
        let query = EntryQuery::from_sender(*sensor)
            .to(self.collector.address())
            .after(after);
        let entries = bounded(self.config.ledger_timeout, "query", self.ledger.query(&query)).await?;
        Ok(entries.iter().filter(|e| e.category.is_reading()).count())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregates
    // ─────────────────────────────────────────────────────────────────────────

    /// The `n`th most recent `function` aggregate of a window, 0-based.
    pub async fn nth_latest_aggregate(
        &self,
        sensor: &Address,
        granularity: Granularity,
        function: AggregateFunction,
        n: usize,
    ) -> Result<AggregateView> {
        let entry = self
            .latest_aggregates(sensor, granularity, function, n, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::NoRecordsFound(format!(
                    "window {} has no {} aggregate #{} for sensor {}",
                    granularity,
                    function.code(),
                    n,
                    sensor
                ))
            })?;
        let spec = self.windows.get(granularity)?;
        let key = derive_shared_secret(&spec.reporter, sensor)?;
        let value = decode(&transform(entry.seq, &key, &entry.payload)).map_err(CoreError::from)?;
        Ok(AggregateView {
            function,
            value,
            range: marker_range(&entry)?,
            seq: entry.seq,
            timestamp: entry.timestamp,
        })
    }

    /// The raw readings behind the `n`th most recent AVG aggregate.
    pub async fn readings_for_aggregate(
        &self,
        sensor: &Address,
        granularity: Granularity,
        n: usize,
    ) -> Result<ReadingSet> {
        let view = self
            .nth_latest_aggregate(sensor, granularity, AggregateFunction::Avg, n)
            .await?;
        let entries = bounded(
            self.config.ledger_timeout,
            "query_range",
            self.ledger.query_range(sensor, view.range),
        )
        .await?;
        self.decrypt(sensor, &entries)
    }

    /// Truncating mean of the last `n` AVG aggregates of a window.
    ///
    /// Aggregates that fail to decode are logged and left out.
    pub async fn average_of_latest_aggregates(
        &self,
        sensor: &Address,
        granularity: Granularity,
        n: usize,
    ) -> Result<i64> {
        let entries = self
            .latest_aggregates(sensor, granularity, AggregateFunction::Avg, 0, n)
            .await?;
        let spec = self.windows.get(granularity)?;
        let key = derive_shared_secret(&spec.reporter, sensor)?;

        let values = entries.iter().filter_map(|entry| {
            match decode(&transform(entry.seq, &key, &entry.payload)) {
                Ok(value) => Some(value),
                Err(reason) => {
                    warn!(seq = entry.seq, %reason, "skipping undecodable aggregate");
                    None
                }
            }
        });
        RunningStats::from_values(values)?
            .map(|stats| stats.avg())
            .ok_or_else(|| {
                Error::NoRecordsFound(format!(
                    "window {} has no AVG aggregates for sensor {}",
                    granularity, sensor
                ))
            })
    }

    /// Raw entries covered by the `n`th most recent aggregate, read from its markers.
    pub async fn covered_count(
        &self,
        sensor: &Address,
        granularity: Granularity,
        n: usize,
    ) -> Result<u64> {
        let entry = self
            .latest_aggregates(sensor, granularity, AggregateFunction::Avg, n, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::NoRecordsFound(format!(
                    "window {} has no aggregate #{} for sensor {}",
                    granularity, n, sensor
                ))
            })?;
        Ok(marker_range(&entry)?.len())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn latest_aggregates(
        &self,
        sensor: &Address,
        granularity: Granularity,
        function: AggregateFunction,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let spec = self.windows.get(granularity)?;
        let query = EntryQuery::from_sender(spec.reporter.address())
            .to(*sensor)
            .category(EntryCategory::Aggregate(function))
            .newest_first()
            .offset(offset)
            .limit(limit);
        let entries = bounded(self.config.ledger_timeout, "query", self.ledger.query(&query)).await?;
        debug!(%sensor, %granularity, found = entries.len(), "listed aggregates");
        Ok(entries)
    }

    fn decrypt<'a, I>(&self, sensor: &Address, entries: I) -> Result<ReadingSet>
    where
        I: IntoIterator<Item = &'a LogEntry>,
    {
        let key = derive_shared_secret(&self.collector, sensor)?;
        Ok(collect_readings(entries, &self.collector.address(), &key))
    }
}

fn marker_range(entry: &LogEntry) -> Result<SeqRange> {
    entry.source_range().ok_or_else(|| {
        Error::Core(CoreError::MalformedEntry(format!(
            "aggregate {} of {} has no range markers",
            entry.seq, entry.sender
        )))
    })
}
