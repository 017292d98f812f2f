//! Error types for the ledger module.

use sensorlog_core::Address;
use thiserror::Error;

/// Errors that can occur during ledger operations.
///
/// A sequence conflict is not an error here: it is reported as
/// [`SubmitResult::SequenceConflict`](crate::SubmitResult) so callers can retry.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Marker column encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The sender has never been opened on this ledger.
    #[error("unknown account: {0}")]
    UnknownAccount(Address),

    /// Entry rejected by structural validation, or corrupt stored data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding ledger state was poisoned by a panicking writer.
    #[error("ledger state poisoned: {0}")]
    Poisoned(String),

    /// A blocking database task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sensorlog_core::CoreError> for LedgerError {
    fn from(err: sensorlog_core::CoreError) -> Self {
        LedgerError::InvalidData(err.to_string())
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
