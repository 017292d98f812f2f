//! Error types for sensorlog core.

use thiserror::Error;

/// Core errors that can occur during key handling and entry construction.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Public or private key material that cannot be used for key agreement.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A plaintext block that does not hold a decimal reading.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Checked statistics arithmetic overflowed.
    #[error("arithmetic overflow while folding {0}")]
    Overflow(&'static str),

    #[error("malformed entry: {0}")]
    MalformedEntry(String),
}

/// Reasons a 32-byte plaintext block fails to decode into a reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("block is empty after trimming padding")]
    Empty,

    #[error("block is not valid UTF-8")]
    NotUtf8,

    #[error("block is not a decimal integer: {0:?}")]
    NotNumeric(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
