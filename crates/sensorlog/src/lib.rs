//! # Sensorlog
//!
//! Confidential sensor telemetry over a public append-only log.
//!
//! ## Overview
//!
//! Sensors publish encrypted readings to a shared log, addressed to a
//! collector. Only the two parties of a channel can read its payloads. This
//! crate provides:
//!
//! - **Batch aggregation**: decrypt a sequence range of one sensor's
//!   readings and publish AVG/MIN/MAX back to the sensor from a
//!   per-window reporter identity
//! - **Tiered windows**: coarser windows computed from finer aggregates
//! - **Browsing**: time, value and aggregate-driven read-only queries
//! - **Streaming rollups**: see [`rollup`]
//!
//! ## Key Concepts
//!
//! - **Window**: an aggregation period ([`Granularity`]) with its own reporter.
//! - **Range marker**: the `[start, end)` pair each aggregate carries so its
//!   source can be found without decrypting anything.
//! - **Sequence conflict**: the reporter's predicted counter was stale. The
//!   engine reloads it and resubmits.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sensorlog::{AggregatorConfig, BatchAggregator, Granularity, WindowTable};
//! use sensorlog::core::{Identity, SeqRange};
//! use sensorlog::ledger::SqliteLedger;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example(sensor: sensorlog::core::Address) -> sensorlog::Result<()> {
//!     let ledger = Arc::new(SqliteLedger::open("ledger.db")?);
//!     let collector = sensorlog::config::collector_from_lookup(|k| std::env::var(k).ok())?;
//!     let windows = WindowTable::from_env()?;
//!     let engine = BatchAggregator::new(ledger, collector, windows, AggregatorConfig::default());
//!
//!     let report = engine
//!         .aggregate(&sensor, SeqRange::new(0, 12), Granularity::OneMinute, &CancellationToken::new())
//!         .await?;
//!     println!("{} readings, avg {:?}", report.count, report.value(sensorlog::core::AggregateFunction::Avg));
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `sensorlog::core` - Identities, channel crypto, codec, log entries
//! - `sensorlog::ledger` - The log abstraction, memory and SQLite
//! - `sensorlog::rollup` - Streaming calendar-bucketed aggregation

pub mod batch;
pub mod browse;
pub mod config;
pub mod error;
pub mod reading;
pub mod telemetry;

// Re-export component crates
pub use sensorlog_core as core;
pub use sensorlog_ledger as ledger;
pub use sensorlog_rollup as rollup;

// Re-export main types for convenience
pub use batch::{
    compute, AggregateReport, AggregateResult, BatchAggregator, EmittedAggregate, Phase,
    ScanOutcome,
};
pub use browse::{AggregateView, Browser, ValuePredicate};
pub use config::{AggregatorConfig, Granularity, WindowSource, WindowSpec, WindowTable};
pub use error::{Error, Result};
pub use reading::{classify_raw, collect_readings, Reading, ReadingSet, SkipReason};
pub use telemetry::{init_tracing, TelemetryConfig};

// Re-export commonly used core types
pub use sensorlog_core::{
    Account, Address, AggregateFunction, EntryCategory, Identity, LogEntry, PhysicalQuantity,
    RunningStats, SeqRange, Signable,
};
