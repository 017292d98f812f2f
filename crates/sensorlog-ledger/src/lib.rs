//! # Sensorlog Ledger
//!
//! The public log collaborator: a trait-based interface to an append-only,
//! per-account sequenced log, with in-memory and SQLite implementations.
//!
//! ## Key Types
//!
//! - [`Ledger`] - The async trait for all log operations
//! - [`MemoryLedger`] - In-memory log for tests and fixtures
//! - [`SqliteLedger`] - SQLite-backed durable mirror
//! - [`SubmitResult`] - Accepted, or refused with a sequence conflict
//! - [`EntryQuery`] - Filtered, paged listing of one sender's entries
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sensorlog_ledger::{Ledger, SqliteLedger};
//! use sensorlog_core::Identity;
//!
//! async fn example() {
//!     let ledger = SqliteLedger::open("sensorlog.db").unwrap();
//!     let sensor = Identity::generate();
//!     ledger.open_account(&sensor.address(), 0).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Strict sequencing**: an entry is appended only if its `seq` equals the
//!   sender's counter; otherwise `SequenceConflict` and nothing changes
//! - **Ledger time**: append timestamps come from the ledger's [`Clock`]

pub mod clock;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use clock::Clock;
pub use error::{LedgerError, Result};
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{EntryQuery, Ledger, SubmitResult};
