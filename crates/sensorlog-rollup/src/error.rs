//! Error types for the rollup module.

use thiserror::Error;

/// Errors that can occur while folding or querying rollups.
#[derive(Debug, Error)]
pub enum RollupError {
    /// Subject ids must be non-empty and free of the key separator.
    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),

    /// A timestamp that is not RFC 3339.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A string that is not a canonical bucket key.
    #[error("invalid bucket key: {0:?}")]
    InvalidBucket(String),

    /// Range endpoints at different precisions.
    #[error("range endpoints differ in precision: {from:?} and {to:?}")]
    MixedPrecision { from: String, to: String },

    /// Bucket enumeration exceeded its bound or the calendar's range.
    #[error("range arithmetic overflow: {0}")]
    RangeArithmeticOverflow(String),

    /// Stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The state store failed or a lock was poisoned.
    #[error("state store error: {0}")]
    State(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] sensorlog_core::CoreError),
}

/// Result type for rollup operations.
pub type Result<T> = std::result::Result<T, RollupError>;
