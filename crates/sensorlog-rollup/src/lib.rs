//! # Sensorlog Rollup
//!
//! Streaming aggregation: nested, calendar-bucketed running statistics
//! maintained as each plaintext reading arrives inside a trusted executor.
//!
//! ## Overview
//!
//! A reading timestamped `2021-06-05T18:04:10Z` is folded into four
//! records, keyed `subject~2021-06-05T18:04`, `subject~2021-06-05T18`,
//! `subject~2021-06-05` and `subject~2021-06`. Range questions ("how many
//! events since Tuesday", "min/max/avg over these hours") are answered by
//! re-folding stored records.
//!
//! ## Key Types
//!
//! - [`RollupEngine`] - Fold and query logic
//! - [`StateStore`] - The executor's key/value contract
//! - [`AggregateRecord`] - count/sum/min/max of one `(subject, bucket)`
//! - [`Precision`] - minute, hour, day or month
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sensorlog_rollup::{MemoryStateStore, RollupEngine};
//!
//! let engine = RollupEngine::new(MemoryStateStore::new());
//! engine.record_rfc3339("asdf", 600, "celsius", "2021-06-05T18:04:00Z").unwrap();
//! let record = engine.get("asdf", "2021-06-05T18:04").unwrap();
//! ```

pub mod bucket;
pub mod engine;
pub mod error;
pub mod record;
pub mod state;

pub use bucket::{bucket_keys, enumerate, Precision};
pub use engine::{RangeSummary, RollupConfig, RollupEngine};
pub use error::{Result, RollupError};
pub use record::{AggregateRecord, LatestEvent};
pub use state::{composite_key, split_key, MemoryStateStore, StateStore, KEY_SEPARATOR};
