//! SQLite implementation of the FeedStorage trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. Durability: the
//! database runs in WAL mode with synchronous=FULL, so `append_entry`
//! does not return before the entry has reached disk.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use spacefold_core::{decode_entry, FeedEntry, FeedKey, SpaceId};

use crate::error::{FeedError, Result};
use crate::migration;
use crate::traits::{AppendResult, FeedMeta, FeedStorage};

/// SQLite-based feed storage.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteFeedStorage {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFeedStorage {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        configure(&conn)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| FeedError::Background(format!("mutex poisoned: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| FeedError::Background(format!("spawn_blocking failed: {}", e)))?
    }
}

/// Durability and concurrency pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Decode a stored canonical blob, or report which position is corrupt.
fn decode_row(feed: &FeedKey, seq: u64, canonical: &[u8]) -> Result<FeedEntry> {
    decode_entry(canonical).map_err(|_| FeedError::CorruptEntry {
        feed: feed.to_hex(),
        seq,
    })
}

#[async_trait]
impl FeedStorage for SqliteFeedStorage {
    async fn append_entry(&self, entry: &FeedEntry, canonical: &[u8]) -> Result<AppendResult> {
        let feed_key = entry.feed_key().0.to_vec();
        let seq = entry.seq();
        let space_id = entry.space_id().0.to_vec();
        let timestamp = entry.header.timestamp;
        let kind = entry.kind().to_u16();
        let payload_hash = entry.header.payload_hash.0.to_vec();
        let content_hash = entry.content_hash();
        let canonical = canonical.to_vec();

        self.with_conn(move |conn| {
            // Check for an existing entry at this position
            let existing: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT content_hash FROM entries WHERE feed_key = ?1 AND seq = ?2",
                    params![feed_key, seq],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_hash) = existing {
                if existing_hash == content_hash.0.to_vec() {
                    return Ok(AppendResult::AlreadyExists);
                }
                let mut arr = [0u8; 32];
                if existing_hash.len() == 32 {
                    arr.copy_from_slice(&existing_hash);
                }
                return Ok(AppendResult::Conflict {
                    existing: arr.into(),
                });
            }

            conn.execute(
                "INSERT INTO entries
                    (feed_key, seq, space_id, timestamp, kind, payload_hash,
                     content_hash, canonical, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    feed_key,
                    seq,
                    space_id,
                    timestamp,
                    kind,
                    payload_hash,
                    content_hash.0.to_vec(),
                    canonical,
                    now_millis(),
                ],
            )?;

            Ok(AppendResult::Appended)
        })
        .await
    }

    async fn entry_at(&self, feed: &FeedKey, seq: u64) -> Result<Option<FeedEntry>> {
        let feed = *feed;
        let key_bytes = feed.0.to_vec();

        self.with_conn(move |conn| {
            let canonical: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT canonical FROM entries WHERE feed_key = ?1 AND seq = ?2",
                    params![key_bytes, seq],
                    |row| row.get(0),
                )
                .optional()?;

            match canonical {
                Some(bytes) => Ok(Some(decode_row(&feed, seq, &bytes)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn entries_range(&self, feed: &FeedKey, from: u64, to: u64) -> Result<Vec<FeedEntry>> {
        let feed = *feed;
        let key_bytes = feed.0.to_vec();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, canonical FROM entries
                 WHERE feed_key = ?1 AND seq >= ?2 AND seq < ?3
                 ORDER BY seq",
            )?;

            let rows = stmt.query_map(params![key_bytes, from, to], |row| {
                let seq: u64 = row.get(0)?;
                let canonical: Vec<u8> = row.get(1)?;
                Ok((seq, canonical))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (seq, canonical) = row?;
                match decode_row(&feed, seq, &canonical) {
                    Ok(entry) => entries.push(entry),
                    Err(_) => {
                        // One bad record must not halt the feed.
                        warn!(feed = %feed, seq, "skipping corrupt entry");
                    }
                }
            }

            Ok(entries)
        })
        .await
    }

    async fn feed_len(&self, feed: &FeedKey) -> Result<u64> {
        let key_bytes = feed.0.to_vec();

        self.with_conn(move |conn| {
            let max: Option<u64> = conn
                .query_row(
                    "SELECT MAX(seq) FROM entries WHERE feed_key = ?1",
                    params![key_bytes],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();

            Ok(max.map(|s| s + 1).unwrap_or(0))
        })
        .await
    }

    async fn upsert_feed(&self, meta: &FeedMeta) -> Result<()> {
        let key_bytes = meta.key.0.to_vec();
        let space_id = meta.space_id.0.to_vec();
        let writable = meta.writable as i64;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO feeds (feed_key, space_id, writable, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(feed_key) DO UPDATE SET
                    space_id = excluded.space_id,
                    writable = excluded.writable",
                params![key_bytes, space_id, writable, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn feed(&self, key: &FeedKey) -> Result<Option<FeedMeta>> {
        let key = *key;
        let key_bytes = key.0.to_vec();

        self.with_conn(move |conn| {
            let meta = conn
                .query_row(
                    "SELECT space_id, writable FROM feeds WHERE feed_key = ?1",
                    params![key_bytes],
                    |row| {
                        let space_id: Vec<u8> = row.get(0)?;
                        let writable: i64 = row.get(1)?;
                        Ok((space_id, writable))
                    },
                )
                .optional()?;

            match meta {
                Some((space_id, writable)) => {
                    let mut arr = [0u8; 32];
                    if space_id.len() != 32 {
                        return Err(FeedError::Encoding("invalid space_id length".into()));
                    }
                    arr.copy_from_slice(&space_id);
                    Ok(Some(FeedMeta {
                        key,
                        space_id: SpaceId::from_bytes(arr),
                        writable: writable != 0,
                    }))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_feeds(&self) -> Result<Vec<FeedMeta>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT feed_key, space_id, writable FROM feeds ORDER BY feed_key")?;

            let rows = stmt.query_map([], |row| {
                let key: Vec<u8> = row.get(0)?;
                let space_id: Vec<u8> = row.get(1)?;
                let writable: i64 = row.get(2)?;
                Ok((key, space_id, writable))
            })?;

            let mut feeds = Vec::new();
            for row in rows {
                let (key, space_id, writable) = row?;
                if key.len() != 32 || space_id.len() != 32 {
                    return Err(FeedError::Encoding("invalid feed row".into()));
                }
                let mut key_arr = [0u8; 32];
                key_arr.copy_from_slice(&key);
                let mut space_arr = [0u8; 32];
                space_arr.copy_from_slice(&space_id);
                feeds.push(FeedMeta {
                    key: FeedKey::from_bytes(key_arr),
                    space_id: SpaceId::from_bytes(space_arr),
                    writable: writable != 0,
                });
            }

            Ok(feeds)
        })
        .await
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
