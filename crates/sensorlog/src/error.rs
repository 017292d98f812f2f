//! Error types for sensorlog.

use std::time::Duration;

use sensorlog_core::{Address, CoreError};
use sensorlog_ledger::LedgerError;
use sensorlog_rollup::RollupError;
use thiserror::Error;

/// Errors that can occur during aggregation and browsing.
#[derive(Debug, Error)]
pub enum Error {
    /// Core error (keys, codec, arithmetic).
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Streaming rollup error.
    #[error("rollup error: {0}")]
    Rollup(#[from] RollupError),

    /// The range held no usable entries. Nothing was emitted.
    #[error("no records found: {0}")]
    NoRecordsFound(String),

    /// The reporter kept losing the sequence race.
    ///
    /// `emitted` holds the sequence numbers of this window's aggregates that
    /// were accepted before the conflict; they stay on the log.
    #[error("sequence conflict for reporter {reporter} after {attempts} attempts")]
    SequenceConflict {
        reporter: Address,
        attempts: u32,
        emitted: Vec<u64>,
    },

    /// The operation was cancelled. Partial folds are discarded.
    #[error("operation cancelled")]
    Cancelled,

    /// A ledger call did not finish in time.
    #[error("ledger {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("unknown granularity: {0}")]
    UnknownGranularity(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Task(String),
}

/// Result type for sensorlog operations.
pub type Result<T> = std::result::Result<T, Error>;
