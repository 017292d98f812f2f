//! SQLite implementation of the Ledger trait.
//!
//! A durable local mirror of the public log. Uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use sensorlog_core::{Address, EntryCategory, LogEntry, RangeMarker, SeqRange};

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::migration;
use crate::traits::{EntryQuery, Ledger, SubmitResult};

const ENTRY_COLUMNS: &str = "sender, seq, receiver, timestamp, tag, payload, markers";

/// SQLite-based ledger implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
    clock: Clock,
}

impl SqliteLedger {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Clock::System,
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Clock::System,
        })
    }

    /// Replace the clock used to stamp appended entries.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| LedgerError::Poisoned(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| LedgerError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

/// A raw `entries` row, before byte-length checks.
struct EntryRow {
    sender: Vec<u8>,
    seq: i64,
    receiver: Vec<u8>,
    timestamp: i64,
    tag: i64,
    payload: Vec<u8>,
    markers: Vec<u8>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        sender: row.get("sender")?,
        seq: row.get("seq")?,
        receiver: row.get("receiver")?,
        timestamp: row.get("timestamp")?,
        tag: row.get("tag")?,
        payload: row.get("payload")?,
        markers: row.get("markers")?,
    })
}

impl EntryRow {
    fn into_entry(self) -> Result<LogEntry> {
        let sender = to_array(self.sender, "sender")?;
        let receiver = to_array(self.receiver, "receiver")?;
        let payload = to_array(self.payload, "payload")?;
        let seq = u64::try_from(self.seq)
            .map_err(|_| LedgerError::InvalidData(format!("negative seq {}", self.seq)))?;
        let tag = u16::try_from(self.tag)
            .map_err(|_| LedgerError::InvalidData(format!("tag {} out of range", self.tag)))?;
        Ok(LogEntry {
            sender: Address::from_bytes(sender),
            receiver: Address::from_bytes(receiver),
            seq,
            timestamp: self.timestamp,
            payload,
            category: EntryCategory::from_u16(tag),
            markers: decode_markers(&self.markers)?,
        })
    }
}

fn to_array(bytes: Vec<u8>, column: &str) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|b: Vec<u8>| {
        LedgerError::InvalidData(format!("{} is {} bytes, expected 32", column, b.len()))
    })
}

fn encode_markers(markers: &[RangeMarker]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(markers, &mut buf)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_markers(bytes: &[u8]) -> Result<Vec<RangeMarker>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    ciborium::from_reader(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn seq_to_sql(seq: u64) -> Result<i64> {
    i64::try_from(seq)
        .map_err(|_| LedgerError::InvalidData(format!("seq {} exceeds storage range", seq)))
}

/// Range bounds beyond what SQLite can hold are clamped, never rejected.
fn clamp_seq(seq: u64) -> i64 {
    i64::try_from(seq).unwrap_or(i64::MAX)
}

fn collect_entries(rows: Vec<EntryRow>) -> Result<Vec<LogEntry>> {
    rows.into_iter().map(EntryRow::into_entry).collect()
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn open_account(&self, address: &Address, next_seq: u64) -> Result<u64> {
        let address = *address;
        let next = seq_to_sql(next_seq)?;
        let now = self.clock.now();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO accounts (address, next_seq, opened_at) VALUES (?1, ?2, ?3)",
                params![address.as_bytes().as_slice(), next, now],
            )?;
            let current: i64 = conn.query_row(
                "SELECT next_seq FROM accounts WHERE address = ?1",
                params![address.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            u64::try_from(current)
                .map_err(|_| LedgerError::InvalidData(format!("negative counter {}", current)))
        })
        .await
    }

    async fn next_sequence(&self, address: &Address) -> Result<u64> {
        let address = *address;
        self.blocking(move |conn| {
            let current: Option<i64> = conn
                .query_row(
                    "SELECT next_seq FROM accounts WHERE address = ?1",
                    params![address.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            let current = current.ok_or(LedgerError::UnknownAccount(address))?;
            u64::try_from(current)
                .map_err(|_| LedgerError::InvalidData(format!("negative counter {}", current)))
        })
        .await
    }

    async fn submit(&self, entry: &LogEntry) -> Result<SubmitResult> {
        entry.validate()?;
        let entry = entry.clone();
        let seq = seq_to_sql(entry.seq)?;
        let markers = encode_markers(&entry.markers)?;
        let timestamp = self.clock.now();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let expected: Option<i64> = tx
                .query_row(
                    "SELECT next_seq FROM accounts WHERE address = ?1",
                    params![entry.sender.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            let expected = expected.ok_or(LedgerError::UnknownAccount(entry.sender))?;

            if expected != seq {
                debug!(sender = %entry.sender, expected, got = entry.seq, "sequence conflict");
                let expected = u64::try_from(expected).map_err(|_| {
                    LedgerError::InvalidData(format!("negative counter {}", expected))
                })?;
                return Ok(SubmitResult::SequenceConflict {
                    expected,
                    got: entry.seq,
                });
            }

            tx.execute(
                "INSERT INTO entries (sender, seq, receiver, timestamp, tag, payload, markers)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.sender.as_bytes().as_slice(),
                    seq,
                    entry.receiver.as_bytes().as_slice(),
                    timestamp,
                    entry.category.to_u16() as i64,
                    entry.payload.as_slice(),
                    markers,
                ],
            )?;
            tx.execute(
                "UPDATE accounts SET next_seq = ?2 WHERE address = ?1",
                params![entry.sender.as_bytes().as_slice(), seq.saturating_add(1)],
            )?;
            tx.commit()?;

            Ok(SubmitResult::Accepted {
                seq: entry.seq,
                timestamp,
            })
        })
        .await
    }

    async fn query_range(&self, sender: &Address, range: SeqRange) -> Result<Vec<LogEntry>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let sender = *sender;
        let (start, end) = (clamp_seq(range.start), clamp_seq(range.end));

        let rows = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM entries WHERE sender = ?1 AND seq >= ?2 AND seq < ?3 ORDER BY seq",
                    ENTRY_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![sender.as_bytes().as_slice(), start, end], read_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        collect_entries(rows)
    }

    async fn query_by_time(&self, sender: &Address, from: i64, to: i64) -> Result<Vec<LogEntry>> {
        let sender = *sender;
        let rows = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM entries
                     WHERE sender = ?1 AND timestamp > ?2 AND timestamp <= ?3 ORDER BY seq",
                    ENTRY_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![sender.as_bytes().as_slice(), from, to], read_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        collect_entries(rows)
    }

    async fn query(&self, query: &EntryQuery) -> Result<Vec<LogEntry>> {
        let mut sql = format!("SELECT {} FROM entries WHERE sender = ?", ENTRY_COLUMNS);
        let mut args = vec![Value::Blob(query.sender.as_bytes().to_vec())];

        if let Some(receiver) = query.receiver {
            sql.push_str(" AND receiver = ?");
            args.push(Value::Blob(receiver.as_bytes().to_vec()));
        }
        if let Some(category) = query.category {
            sql.push_str(" AND tag = ?");
            args.push(Value::Integer(i64::from(category.to_u16())));
        }
        if let Some(after) = query.after {
            sql.push_str(" AND timestamp > ?");
            args.push(Value::Integer(after));
        }
        sql.push_str(if query.newest_first {
            " ORDER BY seq DESC"
        } else {
            " ORDER BY seq ASC"
        });
        // LIMIT -1 means unbounded
        sql.push_str(" LIMIT ? OFFSET ?");
        args.push(Value::Integer(
            query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX)),
        ));
        args.push(Value::Integer(i64::try_from(query.offset).unwrap_or(i64::MAX)));

        let rows = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(args.iter()), read_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        collect_entries(rows)
    }

    async fn span(&self, sender: &Address) -> Result<Option<SeqRange>> {
        let sender = *sender;
        self.blocking(move |conn| {
            let (first, last): (Option<i64>, Option<i64>) = conn.query_row(
                "SELECT MIN(seq), MAX(seq) FROM entries WHERE sender = ?1",
                params![sender.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            match (first, last) {
                (Some(first), Some(last)) => {
                    let first = u64::try_from(first)
                        .map_err(|_| LedgerError::InvalidData(format!("negative seq {}", first)))?;
                    let last = u64::try_from(last)
                        .map_err(|_| LedgerError::InvalidData(format!("negative seq {}", last)))?;
                    Ok(Some(SeqRange::new(first, last.saturating_add(1))))
                }
                _ => Ok(None),
            }
        })
        .await
    }
}
