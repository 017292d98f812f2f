//! In-memory implementation of the Ledger trait.
//!
//! Same semantics as SQLite but keeps everything in memory with no
//! persistence. Used by tests and by the testkit deployment fixture.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use sensorlog_core::{Address, LogEntry, SeqRange};

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::traits::{EntryQuery, Ledger, SubmitResult};

/// In-memory ledger implementation.
///
/// All data is lost when the ledger is dropped. Thread-safe via RwLock.
pub struct MemoryLedger {
    inner: RwLock<MemoryLedgerInner>,
    clock: Clock,
}

#[derive(Default)]
struct MemoryLedgerInner {
    /// Next expected sequence number per account.
    accounts: HashMap<Address, u64>,

    /// Entries per sender, keyed by seq.
    entries: HashMap<Address, BTreeMap<u64, LogEntry>>,
}

impl MemoryLedger {
    /// Create a new empty ledger stamping entries with the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::System)
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: RwLock::new(MemoryLedgerInner::default()),
            clock,
        }
    }

    /// The clock this ledger stamps entries with.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Total number of entries across all senders.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.entries.values().map(BTreeMap::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryLedgerInner>> {
        self.inner
            .read()
            .map_err(|e| LedgerError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryLedgerInner>> {
        self.inner
            .write()
            .map_err(|e| LedgerError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn open_account(&self, address: &Address, next_seq: u64) -> Result<u64> {
        let mut inner = self.write()?;
        Ok(*inner.accounts.entry(*address).or_insert(next_seq))
    }

    async fn next_sequence(&self, address: &Address) -> Result<u64> {
        let inner = self.read()?;
        inner
            .accounts
            .get(address)
            .copied()
            .ok_or(LedgerError::UnknownAccount(*address))
    }

    async fn submit(&self, entry: &LogEntry) -> Result<SubmitResult> {
        entry.validate()?;
        let mut inner = self.write()?;

        let expected = *inner
            .accounts
            .get(&entry.sender)
            .ok_or(LedgerError::UnknownAccount(entry.sender))?;
        if entry.seq != expected {
            debug!(sender = %entry.sender, expected, got = entry.seq, "sequence conflict");
            return Ok(SubmitResult::SequenceConflict {
                expected,
                got: entry.seq,
            });
        }

        let timestamp = self.clock.now();
        let mut stored = entry.clone();
        stored.timestamp = timestamp;
        inner
            .entries
            .entry(entry.sender)
            .or_default()
            .insert(entry.seq, stored);
        inner.accounts.insert(entry.sender, expected.saturating_add(1));

        Ok(SubmitResult::Accepted {
            seq: entry.seq,
            timestamp,
        })
    }

    async fn query_range(&self, sender: &Address, range: SeqRange) -> Result<Vec<LogEntry>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        Ok(inner
            .entries
            .get(sender)
            .map(|log| log.range(range.start..range.end).map(|(_, e)| e.clone()).collect())
            .unwrap_or_default())
    }

    async fn query_by_time(&self, sender: &Address, from: i64, to: i64) -> Result<Vec<LogEntry>> {
        let inner = self.read()?;
        Ok(inner
            .entries
            .get(sender)
            .map(|log| {
                log.values()
                    .filter(|e| e.timestamp > from && e.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn query(&self, query: &EntryQuery) -> Result<Vec<LogEntry>> {
        let inner = self.read()?;
        let Some(log) = inner.entries.get(&query.sender) else {
            return Ok(Vec::new());
        };
        let limit = query.limit.unwrap_or(usize::MAX);
        let matching = log.values().filter(|e| query.matches(e));
        let page: Vec<LogEntry> = if query.newest_first {
            matching
                .rev()
                .skip(query.offset)
                .take(limit)
                .cloned()
                .collect()
        } else {
            matching.skip(query.offset).take(limit).cloned().collect()
        };
        Ok(page)
    }

    async fn span(&self, sender: &Address) -> Result<Option<SeqRange>> {
        let inner = self.read()?;
        let Some(log) = inner.entries.get(sender) else {
            return Ok(None);
        };
        match (log.keys().next(), log.keys().next_back()) {
            (Some(&first), Some(&last)) => Ok(Some(SeqRange::new(first, last.saturating_add(1)))),
            _ => Ok(None),
        }
    }
}
