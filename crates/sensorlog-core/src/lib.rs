//! # Sensorlog Core
//!
//! Pure primitives for confidential sensor logging: identities, the
//! symmetric channel between two identities, the reading codec, log entries
//! and running statistics.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Identity`] / [`Address`] - Ed25519 keypair and its public half
//! - [`ChannelKey`] - Per-pair symmetric key from [`derive_shared_secret`]
//! - [`LogEntry`] - An immutable record of the public log
//! - [`RunningStats`] - count/sum/min/max fold
//! - [`Account`] - An identity plus its predicted sequence counter
//!
//! ## Channel
//!
//! Payloads are encrypted with [`transform`], keyed by the channel key and
//! the sender's sequence number. See [`crypto`] module.

pub mod account;
pub mod codec;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod stats;
pub mod types;

pub use account::{Account, Signable};
pub use codec::{decode, encode};
pub use crypto::{counter_block, derive_shared_secret, seal, transform, Address, ChannelKey, Identity};
pub use entry::{
    AggregateFunction, EntryCategory, LogEntry, PhysicalQuantity, RangeBound, RangeMarker,
};
pub use error::{CoreError, DecodeError, Result};
pub use stats::{merge_partials, RunningStats};
pub use types::{Block, SeqRange, BLOCK_LEN};
