//! The batch aggregation engine.
//!
//! One invocation walks `Scanning → Computing → Emitting → Done`, or stops
//! at `Empty` when the range holds nothing usable:
//!
//! 1. **Scanning** reads the sensor's entries in a sequence range and
//!    decrypts them in parallel. A tiered window reads the finer
//!    reporter's aggregates instead.
//! 2. **Computing** merges the partial folds into one [`RunningStats`].
//! 3. **Emitting** publishes AVG, MIN and MAX from the window's reporter to
//!    the sensor, each carrying the `[start, end)` range it covers.
//!
//! Emissions from one reporter are serialised behind a per-reporter lock.
//! Everything else (sensors, tiers) may run in parallel.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sensorlog_core::{
    decode, derive_shared_secret, encode, seal, transform, Account, Address, AggregateFunction,
    EntryCategory, Identity, LogEntry, RunningStats, SeqRange, Signable,
};
use sensorlog_ledger::{EntryQuery, Ledger, SubmitResult};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AggregatorConfig, Granularity, WindowSource, WindowSpec, WindowTable};
use crate::error::{Error, Result};
use crate::reading::classify_raw;

/// Where an invocation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Computing,
    Emitting,
    Done,
    /// Nothing usable in the range; nothing emitted.
    Empty,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Scanning => "scanning",
            Phase::Computing => "computing",
            Phase::Emitting => "emitting",
            Phase::Done => "done",
            Phase::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// The fold produced by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// `None` when no entry was usable.
    pub stats: Option<RunningStats>,
    /// Entries examined.
    pub scanned: usize,
    /// Entries examined but left out.
    pub skipped: usize,
    /// Raw sequence range the fold covers.
    pub covered: SeqRange,
}

/// One computed aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub function: AggregateFunction,
    pub value: i64,
    pub range: SeqRange,
}

/// An aggregate accepted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmittedAggregate {
    pub result: AggregateResult,
    /// The reporter's sequence number for the entry.
    pub seq: u64,
    pub timestamp: i64,
}

/// Outcome of one successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub sensor: Address,
    pub granularity: Granularity,
    /// The range recorded in the emitted markers.
    pub range: SeqRange,
    /// Values folded. For a tiered window, finer windows combined.
    pub count: u64,
    pub skipped: usize,
    /// AVG, MIN and MAX, in that order.
    pub emitted: Vec<EmittedAggregate>,
}

impl AggregateReport {
    pub fn value(&self, function: AggregateFunction) -> Option<i64> {
        self.emitted
            .iter()
            .find(|e| e.result.function == function)
            .map(|e| e.result.value)
    }
}

struct ReporterSlot {
    account: Account,
    /// Whether the counter has been read from the ledger yet.
    loaded: bool,
}

/// Computes and publishes window aggregates.
pub struct BatchAggregator<L: Ledger> {
    ledger: Arc<L>,
    collector: Identity,
    windows: WindowTable,
    config: AggregatorConfig,
    reporters: HashMap<Granularity, Mutex<ReporterSlot>>,
}

impl<L: Ledger + 'static> BatchAggregator<L> {
    /// Create an aggregator reading raw entries addressed to `collector`.
    pub fn new(
        ledger: Arc<L>,
        collector: Identity,
        windows: WindowTable,
        config: AggregatorConfig,
    ) -> Self {
        let reporters = windows
            .iter()
            .map(|spec| {
                let slot = ReporterSlot {
                    account: Account::new(spec.reporter.clone(), 0),
                    loaded: false,
                };
                (spec.granularity, Mutex::new(slot))
            })
            .collect();
        Self {
            ledger,
            collector,
            windows,
            config,
            reporters,
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn windows(&self) -> &WindowTable {
        &self.windows
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn collector(&self) -> Address {
        self.collector.address()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────────

    /// Open every reporter's ledger account and load its counter.
    ///
    /// Accounts load concurrently. The first failure aborts the rest.
    pub async fn open_reporter_accounts(&self) -> Result<()> {
        let mut tasks = JoinSet::new();
        for spec in self.windows.iter() {
            let ledger = Arc::clone(&self.ledger);
            let granularity = spec.granularity;
            let address = spec.reporter.address();
            let after = self.config.ledger_timeout;
            tasks.spawn(async move {
                let next =
                    bounded(after, "open_account", ledger.open_account(&address, 0)).await?;
                Ok::<_, Error>((granularity, next))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (granularity, next) = joined.map_err(|e| Error::Task(e.to_string()))??;
            let Some(slot) = self.reporters.get(&granularity) else {
                continue;
            };
            let mut slot = slot.lock().await;
            slot.account.reload(next);
            slot.loaded = true;
            debug!(%granularity, next, "reporter account loaded");
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scanning
    // ─────────────────────────────────────────────────────────────────────────

    /// Decrypt and fold the sensor's raw readings in `range`.
    ///
    /// Decryption is split across `scan_workers` blocking tasks. A cancelled
    /// token discards every partial fold.
    pub async fn scan(
        &self,
        sensor: &Address,
        range: SeqRange,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut entries = bounded(
            self.config.ledger_timeout,
            "query_range",
            self.ledger.query_range(sensor, range),
        )
        .await?;
        let scanned = entries.len();
        let key = derive_shared_secret(&self.collector, sensor)?;
        let collector = self.collector.address();
        let chunk = scanned.div_ceil(self.config.scan_workers.max(1)).max(1);

        let mut tasks = JoinSet::new();
        while !entries.is_empty() {
            let rest = entries.split_off(chunk.min(entries.len()));
            let part = std::mem::replace(&mut entries, rest);
            let key = key.clone();
            let cancel = cancel.clone();
            tasks.spawn_blocking(move || -> Result<(Option<RunningStats>, usize)> {
                let mut stats: Option<RunningStats> = None;
                let mut skipped = 0usize;
                for entry in &part {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    match classify_raw(entry, &collector, &key) {
                        Ok(reading) => match stats.as_mut() {
                            Some(s) => s.push(reading.value)?,
                            None => stats = Some(RunningStats::new(reading.value)),
                        },
                        Err(reason) => {
                            warn!(seq = entry.seq, ?reason, "skipping raw entry");
                            skipped += 1;
                        }
                    }
                }
                Ok((stats, skipped))
            });
        }

        let mut partials = Vec::new();
        let mut skipped = 0;
        while let Some(joined) = tasks.join_next().await {
            let (partial, part_skipped) = joined.map_err(|e| Error::Task(e.to_string()))??;
            partials.push(partial);
            skipped += part_skipped;
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let stats = sensorlog_core::merge_partials(partials)?;
        debug!(%sensor, %range, scanned, skipped, "raw scan finished");
        Ok(ScanOutcome {
            stats,
            scanned,
            skipped,
            covered: range,
        })
    }

    /// Combine the `finer` tier's aggregates whose ranges lie inside `range`.
    ///
    /// When a finer block was emitted more than once, only the copy with the
    /// highest sequence number is used.
    ///
    /// The fold's `count` and `sum` are over the finer AVG values, so its
    /// `avg()` is their truncating mean. `min` and `max` come from the
    /// finer MIN and MAX entries.
    pub async fn scan_finer(
        &self,
        sensor: &Address,
        range: SeqRange,
        finer: Granularity,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let spec = self.windows.get(finer)?;
        let query = EntryQuery::from_sender(spec.reporter.address()).to(*sensor);
        let entries = bounded(
            self.config.ledger_timeout,
            "query",
            self.ledger.query(&query),
        )
        .await?;
        let key = derive_shared_secret(&spec.reporter, sensor)?;

        // A block aggregated more than once is counted once, from its newest emission.
        let mut latest: HashMap<(AggregateFunction, SeqRange), &LogEntry> = HashMap::new();
        let mut scanned = 0;
        let mut skipped = 0;
        let mut superseded = 0;
        for entry in &entries {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(source) = entry.source_range() else {
                continue;
            };
            if source.start < range.start || source.end > range.end {
                continue;
            }
            let EntryCategory::Aggregate(function) = entry.category else {
                scanned += 1;
                skipped += 1;
                continue;
            };
            match latest.get(&(function, source)).map(|kept| kept.seq) {
                Some(kept) if kept >= entry.seq => superseded += 1,
                Some(_) => {
                    superseded += 1;
                    latest.insert((function, source), entry);
                }
                None => {
                    scanned += 1;
                    latest.insert((function, source), entry);
                }
            }
        }

        let mut avgs = Vec::new();
        let mut min: Option<i64> = None;
        let mut max: Option<i64> = None;
        let mut covered = SeqRange::new(range.start, range.start);
        for ((function, source), entry) in latest {
            let value = match decode(&transform(entry.seq, &key, &entry.payload)) {
                Ok(value) => value,
                Err(reason) => {
                    warn!(seq = entry.seq, %reason, "skipping undecodable aggregate");
                    skipped += 1;
                    continue;
                }
            };
            match function {
                AggregateFunction::Avg => avgs.push(value),
                AggregateFunction::Min => min = Some(min.map_or(value, |m| m.min(value))),
                AggregateFunction::Max => max = Some(max.map_or(value, |m| m.max(value))),
            }
            covered = covered.union(&source);
        }

        let stats = match (RunningStats::from_values(avgs)?, min, max) {
            (Some(mut stats), Some(min), Some(max)) => {
                stats.min = min;
                stats.max = max;
                Some(stats)
            }
            _ => None,
        };
        debug!(%sensor, %range, %finer, scanned, skipped, superseded, "tiered scan finished");
        Ok(ScanOutcome {
            stats,
            scanned,
            skipped,
            covered,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregation
    // ─────────────────────────────────────────────────────────────────────────

    /// Aggregate `range` of the sensor's log for one window and publish the results.
    ///
    /// Fails with [`Error::NoRecordsFound`] when nothing in the range is
    /// usable; nothing is emitted in that case.
    ///
    /// AVG, MIN and MAX are separate entries. If one of them exhausts its
    /// conflict retries, the ones accepted before it remain on the log and
    /// are listed in [`Error::SequenceConflict`]'s `emitted`.
    pub async fn aggregate(
        &self,
        sensor: &Address,
        range: SeqRange,
        granularity: Granularity,
        cancel: &CancellationToken,
    ) -> Result<AggregateReport> {
        let spec = self.windows.get(granularity)?;
        debug!(%sensor, %range, %granularity, phase = %Phase::Scanning);
        let outcome = match spec.source {
            WindowSource::Raw => self.scan(sensor, range, cancel).await?,
            WindowSource::Finer(finer) => self.scan_finer(sensor, range, finer, cancel).await?,
        };

        let Some(stats) = outcome.stats else {
            debug!(%sensor, %range, %granularity, phase = %Phase::Empty, skipped = outcome.skipped);
            return Err(Error::NoRecordsFound(format!(
                "sensor {} has no usable entries in {} for window {}",
                sensor, range, granularity
            )));
        };

        debug!(%sensor, %granularity, phase = %Phase::Computing, count = stats.count);
        let results = compute(&stats, outcome.covered);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        debug!(%sensor, %granularity, phase = %Phase::Emitting);
        let emitted = self.emit(spec, sensor, &results).await?;

        info!(
            %sensor,
            %granularity,
            range = %outcome.covered,
            count = stats.count,
            skipped = outcome.skipped,
            phase = %Phase::Done,
            "aggregates published"
        );
        Ok(AggregateReport {
            sensor: *sensor,
            granularity,
            range: outcome.covered,
            count: stats.count,
            skipped: outcome.skipped,
            emitted,
        })
    }

    /// Aggregate `span` in consecutive windows of the tier's block size.
    ///
    /// Blocks without usable entries are logged and skipped. Any other
    /// error stops the walk.
    pub async fn aggregate_series(
        &self,
        sensor: &Address,
        span: SeqRange,
        granularity: Granularity,
        cancel: &CancellationToken,
    ) -> Result<Vec<AggregateReport>> {
        let block_size = self.windows.get(granularity)?.block_size;
        let mut reports = Vec::new();
        for block in span.chunks(block_size) {
            match self.aggregate(sensor, block, granularity, cancel).await {
                Ok(report) => reports.push(report),
                Err(Error::NoRecordsFound(reason)) => {
                    info!(%sensor, %block, %granularity, %reason, "skipping empty block");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reports)
    }

    /// [`aggregate_series`](Self::aggregate_series) over the sensor's whole log.
    pub async fn aggregate_all(
        &self,
        sensor: &Address,
        granularity: Granularity,
        cancel: &CancellationToken,
    ) -> Result<Vec<AggregateReport>> {
        let span = bounded(
            self.config.ledger_timeout,
            "span",
            self.ledger.span(sensor),
        )
        .await?
        .ok_or_else(|| Error::NoRecordsFound(format!("sensor {} has no entries", sensor)))?;
        self.aggregate_series(sensor, span, granularity, cancel).await
    }

    /// Aggregate the same range for many sensors concurrently.
    ///
    /// Sensors without usable entries are left out of the result. The
    /// first other failure cancels the remaining sensors and is returned.
    pub async fn aggregate_sensors(
        self: &Arc<Self>,
        sensors: &[Address],
        range: SeqRange,
        granularity: Granularity,
        cancel: &CancellationToken,
    ) -> Result<Vec<AggregateReport>> {
        let group = cancel.child_token();
        let mut tasks = JoinSet::new();
        for (index, sensor) in sensors.iter().copied().enumerate() {
            let this = Arc::clone(self);
            let group = group.clone();
            tasks.spawn(async move {
                let outcome = this.aggregate(&sensor, range, granularity, &group).await;
                (index, outcome)
            });
        }

        let mut reports = Vec::with_capacity(sensors.len());
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(report))) => reports.push((index, report)),
                Ok((_, Err(Error::NoRecordsFound(reason)))) => {
                    info!(%granularity, %reason, "sensor has nothing to aggregate");
                }
                Ok((_, Err(e))) => {
                    group.cancel();
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    group.cancel();
                    failure.get_or_insert(Error::Task(e.to_string()));
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        reports.sort_by_key(|(index, _)| *index);
        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Emission
    // ─────────────────────────────────────────────────────────────────────────

    async fn emit(
        &self,
        spec: &WindowSpec,
        sensor: &Address,
        results: &[AggregateResult],
    ) -> Result<Vec<EmittedAggregate>> {
        let slot = self
            .reporters
            .get(&spec.granularity)
            .ok_or_else(|| Error::UnknownGranularity(spec.granularity.to_string()))?;
        let mut slot = slot.lock().await;
        if !slot.loaded {
            let address = slot.account.address();
            let next = bounded(
                self.config.ledger_timeout,
                "open_account",
                self.ledger.open_account(&address, 0),
            )
            .await?;
            slot.account.reload(next);
            slot.loaded = true;
        }

        let mut emitted: Vec<EmittedAggregate> = Vec::with_capacity(results.len());
        for result in results {
            match self.submit_one(&mut slot.account, sensor, result).await {
                Ok(aggregate) => emitted.push(aggregate),
                Err(Error::SequenceConflict {
                    reporter, attempts, ..
                }) => {
                    return Err(Error::SequenceConflict {
                        reporter,
                        attempts,
                        emitted: emitted.iter().map(|e| e.seq).collect(),
                    })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(emitted)
    }

    /// Submit one aggregate, recomputing the payload after each conflict.
    async fn submit_one(
        &self,
        account: &mut Account,
        sensor: &Address,
        result: &AggregateResult,
    ) -> Result<EmittedAggregate> {
        let reporter = account.address();
        let plain = encode(result.value);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let seq = account.sequence();
            let payload = seal(account.identity(), sensor, seq, &plain)?;
            // stamped by the ledger
            let entry = LogEntry::aggregate(
                reporter,
                *sensor,
                seq,
                0,
                result.function,
                payload,
                result.range,
            );
            let submitted = bounded(
                self.config.ledger_timeout,
                "submit",
                self.ledger.submit(&entry),
            )
            .await?;
            match submitted {
                SubmitResult::Accepted { seq, timestamp } => {
                    account.advance_past(seq);
                    debug!(
                        %reporter,
                        %sensor,
                        function = result.function.code(),
                        seq,
                        "aggregate accepted"
                    );
                    return Ok(EmittedAggregate {
                        result: *result,
                        seq,
                        timestamp,
                    });
                }
                SubmitResult::SequenceConflict { expected, got } => {
                    warn!(%reporter, expected, got, attempts, "sequence conflict");
                    if attempts > self.config.max_submit_retries {
                        return Err(Error::SequenceConflict {
                            reporter,
                            attempts,
                            emitted: Vec::new(),
                        });
                    }
                    let next = bounded(
                        self.config.ledger_timeout,
                        "next_sequence",
                        self.ledger.next_sequence(&reporter),
                    )
                    .await?;
                    account.reload(next);
                }
            }
        }
    }
}

/// AVG, MIN and MAX of a fold, each covering `range`.
pub fn compute(stats: &RunningStats, range: SeqRange) -> [AggregateResult; 3] {
    AggregateFunction::ALL.map(|function| AggregateResult {
        function,
        value: match function {
            AggregateFunction::Avg => stats.avg(),
            AggregateFunction::Min => stats.min,
            AggregateFunction::Max => stats.max,
        },
        range,
    })
}

/// Run a ledger call under a deadline.
pub(crate) async fn bounded<T, F>(after: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = sensorlog_ledger::Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}
