//! Database schema migrations for SQLite.
//!
//! Each migration is a SQL batch that transforms the schema from version N
//! to N+1.

use rusqlite::Connection;

use crate::clock::now_secs;
use crate::error::{LedgerError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(LedgerError::Migration(format!(
            "database is at version {}, newer than supported {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_secs()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(LedgerError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: accounts and entries.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE accounts (
            address BLOB PRIMARY KEY,         -- 32 bytes, Ed25519 public key
            next_seq INTEGER NOT NULL,
            opened_at INTEGER NOT NULL
        );

        CREATE TABLE entries (
            sender BLOB NOT NULL,
            seq INTEGER NOT NULL,
            receiver BLOB NOT NULL,
            timestamp INTEGER NOT NULL,       -- append time (Unix seconds)
            tag INTEGER NOT NULL,             -- EntryCategory as u16
            payload BLOB NOT NULL,            -- 32 bytes, encrypted
            markers BLOB NOT NULL,            -- CBOR array of range markers
            PRIMARY KEY (sender, seq)
        );

        CREATE INDEX idx_entries_sender_time ON entries(sender, timestamp);
        "#,
    )?;

    Ok(())
}

/// Migration v2: index for per-receiver aggregate lookups.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE INDEX idx_entries_sender_receiver_tag ON entries(sender, receiver, tag, seq);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"entries".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_rejects_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, 0)",
            [CURRENT_VERSION + 1],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(LedgerError::Migration(_))));
    }
}
