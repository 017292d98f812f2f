//! Ledger trait: the abstract interface to the append-only public log.
//!
//! The log is the sole source of ordering and durability. Each account has
//! a sequence counter that the log advances by exactly one per accepted
//! entry; a submission whose sequence number does not match the counter is
//! refused with [`SubmitResult::SequenceConflict`].

use async_trait::async_trait;
use sensorlog_core::{Address, EntryCategory, LogEntry, SeqRange};

use crate::error::Result;

/// Result of submitting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitResult {
    /// The entry was appended at `seq`, stamped with `timestamp`.
    Accepted { seq: u64, timestamp: i64 },
    /// The sender's counter had moved on; nothing was appended.
    SequenceConflict {
        /// The counter the ledger holds for the sender.
        expected: u64,
        /// The sequence number the entry carried.
        got: u64,
    },
}

impl SubmitResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitResult::Accepted { .. })
    }
}

/// A filtered listing of one sender's entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryQuery {
    pub sender: Address,
    pub receiver: Option<Address>,
    pub category: Option<EntryCategory>,
    /// Only entries appended strictly after this time (Unix seconds).
    pub after: Option<i64>,
    /// Order by descending sequence number instead of ascending.
    pub newest_first: bool,
    /// Number of matching entries to skip.
    pub offset: usize,
    pub limit: Option<usize>,
}

impl EntryQuery {
    /// All entries of `sender`, oldest first.
    pub fn from_sender(sender: Address) -> Self {
        Self {
            sender,
            receiver: None,
            category: None,
            after: None,
            newest_first: false,
            offset: 0,
            limit: None,
        }
    }

    pub fn to(mut self, receiver: Address) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn category(mut self, category: EntryCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn after(mut self, timestamp: i64) -> Self {
        self.after = Some(timestamp);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `entry` passes every filter except ordering and paging.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        entry.sender == self.sender
            && self.receiver.map_or(true, |r| entry.receiver == r)
            && self.category.map_or(true, |c| entry.category == c)
            && self.after.map_or(true, |t| entry.timestamp > t)
    }
}

/// The Ledger trait: async interface to the public log.
///
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the runtime.
#[async_trait]
pub trait Ledger: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Account Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an account whose first entry will carry `next_seq`.
    ///
    /// Idempotent: an existing account keeps its counter. Returns the
    /// counter in effect afterwards.
    async fn open_account(&self, address: &Address, next_seq: u64) -> Result<u64>;

    /// The sequence number the account's next entry must carry.
    async fn next_sequence(&self, address: &Address) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an entry if its `seq` matches the sender's counter.
    ///
    /// The ledger stamps the append time; the entry's own `timestamp` is ignored.
    async fn submit(&self, entry: &LogEntry) -> Result<SubmitResult>;

    /// Entries of `sender` with `seq` in `[range.start, range.end)`, ascending.
    async fn query_range(&self, sender: &Address, range: SeqRange) -> Result<Vec<LogEntry>>;

    /// Entries of `sender` appended in `(from, to]`, ascending by seq.
    async fn query_by_time(&self, sender: &Address, from: i64, to: i64) -> Result<Vec<LogEntry>>;

    /// Filtered listing.
    async fn query(&self, query: &EntryQuery) -> Result<Vec<LogEntry>>;

    /// The smallest range covering every entry of `sender`, if it has any.
    async fn span(&self, sender: &Address) -> Result<Option<SeqRange>>;
}
