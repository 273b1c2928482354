//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! string that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{FeedError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(FeedError::Encoding(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Entries table: stores all feed entries
        CREATE TABLE entries (
            feed_key BLOB NOT NULL,           -- 32 bytes, Ed25519 public key of the writer
            seq INTEGER NOT NULL,             -- sequence number within the feed (0-indexed)
            space_id BLOB NOT NULL,           -- 32 bytes
            timestamp INTEGER NOT NULL,       -- author-claimed timestamp (Unix ms)
            kind INTEGER NOT NULL,            -- EntryKind as u16
            payload_hash BLOB NOT NULL,       -- 32 bytes, Blake3 hash of payload
            content_hash BLOB NOT NULL,       -- 32 bytes, Blake3 hash of canonical bytes
            canonical BLOB NOT NULL,          -- canonical encoding (header || payload || signature)
            ingested_at INTEGER NOT NULL,     -- local timestamp of ingestion

            PRIMARY KEY (feed_key, seq)
        );

        -- Feed metadata
        CREATE TABLE feeds (
            feed_key BLOB PRIMARY KEY,
            space_id BLOB NOT NULL,
            writable INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        -- Indexes for common queries
        CREATE INDEX idx_entries_kind ON entries(kind);
        CREATE INDEX idx_entries_ingested ON entries(ingested_at);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
