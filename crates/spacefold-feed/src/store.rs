//! FeedStore: the set of feeds making up one space.
//!
//! The store owns a storage backend and the keypairs of locally writable
//! feeds. Remote feeds are read-only handles; their entries arrive through
//! the replication ingest boundary, which is where signatures are checked.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use spacefold_core::{
    canonical_entry_bytes, validate_entry, Blake3Hash, EntryBuilder, EntryKind, FeedEntry,
    FeedKey, Keypair, SpaceId,
};

use crate::error::{FeedError, Result};
use crate::traits::{AppendResult, FeedMeta, FeedStorage};

/// A handle to a single feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    key: FeedKey,
    writable: bool,
}

impl Feed {
    /// The feed's key (its writer's public key).
    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    /// Whether this process can append to the feed.
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Outcome of ingesting a replication-delivered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Entry was stored.
    Stored,
    /// Entry was already present (idempotent).
    Duplicate,
    /// A different entry occupies this position. The writer equivocated
    /// or storage diverged; surfaced, never silently overwritten.
    Conflict {
        /// Content hash of the entry already at this position.
        existing: Blake3Hash,
    },
}

/// Owns the feeds of one space, indexed by key.
pub struct FeedStore<S: FeedStorage> {
    storage: Arc<S>,
    space_id: SpaceId,
    writers: RwLock<HashMap<FeedKey, Keypair>>,
}

impl<S: FeedStorage> FeedStore<S> {
    /// Create a feed store over a storage backend.
    pub fn new(storage: S, space_id: SpaceId) -> Self {
        Self {
            storage: Arc::new(storage),
            space_id,
            writers: RwLock::new(HashMap::new()),
        }
    }

    /// The space this store belongs to.
    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Shared handle to the underlying storage.
    pub fn storage(&self) -> Arc<S> {
        Arc::clone(&self.storage)
    }

    /// Register a local writer and open its feed as writable.
    pub async fn register_writer(&self, keypair: &Keypair) -> Result<Feed> {
        let key = keypair.public_key();

        self.storage
            .upsert_feed(&FeedMeta {
                key,
                space_id: self.space_id,
                writable: true,
            })
            .await?;

        self.writers
            .write()
            .expect("writers lock poisoned")
            .insert(key, keypair.clone());

        Ok(Feed {
            key,
            writable: true,
        })
    }

    /// Open a feed by key, creating metadata for unknown feeds.
    ///
    /// The handle is writable only when the feed's keypair was registered
    /// with [`register_writer`](Self::register_writer); remote feeds come
    /// back read-only.
    pub async fn open(&self, key: FeedKey) -> Result<Feed> {
        let writable = self
            .writers
            .read()
            .expect("writers lock poisoned")
            .contains_key(&key);

        if self.storage.feed(&key).await?.is_none() {
            self.storage
                .upsert_feed(&FeedMeta {
                    key,
                    space_id: self.space_id,
                    writable,
                })
                .await?;
        }

        Ok(Feed { key, writable })
    }

    /// Append a payload to a local feed. Returns the assigned seq.
    ///
    /// Fails with [`FeedError::NotWritable`] when this process does not
    /// hold the feed's signing key. The entry is durably persisted before
    /// this returns.
    pub async fn append(&self, feed: &FeedKey, kind: EntryKind, payload: Vec<u8>) -> Result<u64> {
        let keypair = self
            .writers
            .read()
            .expect("writers lock poisoned")
            .get(feed)
            .cloned()
            .ok_or_else(|| FeedError::NotWritable(feed.to_hex()))?;

        let seq = self.storage.feed_len(feed).await?;

        let entry = EntryBuilder::new(*feed, self.space_id, seq)
            .timestamp(now_millis())
            .kind(kind)
            .payload(payload)
            .sign(&keypair);

        let canonical = canonical_entry_bytes(&entry);

        match self.storage.append_entry(&entry, &canonical).await? {
            AppendResult::Appended | AppendResult::AlreadyExists => Ok(seq),
            AppendResult::Conflict { existing } => Err(FeedError::SequenceConflict {
                feed: feed.to_hex(),
                seq,
                existing: existing.to_hex(),
            }),
        }
    }

    /// Read entries with `from <= seq < to` from a feed.
    ///
    /// Finite, bounded by feed content at call time. Corrupt entries are
    /// skipped by the storage layer (warn-logged), never fatal.
    pub async fn read_range(&self, feed: &FeedKey, from: u64, to: u64) -> Result<Vec<FeedEntry>> {
        self.storage.entries_range(feed, from, to).await
    }

    /// The feed's current length (one past the highest stored seq).
    pub async fn len(&self, feed: &FeedKey) -> Result<u64> {
        self.storage.feed_len(feed).await
    }

    /// List all feeds known to the store.
    pub async fn list(&self) -> Result<Vec<FeedMeta>> {
        self.storage.list_feeds().await
    }

    /// Ingest a replication-delivered entry.
    ///
    /// This is the verified-signature boundary: with `verify` set, the
    /// entry's signature and structure are checked before anything is
    /// stored. The entry must belong to this store's space.
    pub async fn ingest(&self, entry: &FeedEntry, verify: bool) -> Result<IngestOutcome> {
        if entry.space_id() != &self.space_id {
            return Err(FeedError::WrongSpace {
                expected: self.space_id.to_hex(),
                got: entry.space_id().to_hex(),
            });
        }

        if verify {
            validate_entry(entry)?;
        }

        // Make sure the feed is known so consumers can discover it.
        self.open(*entry.feed_key()).await?;

        let canonical = canonical_entry_bytes(entry);
        match self.storage.append_entry(entry, &canonical).await? {
            AppendResult::Appended => Ok(IngestOutcome::Stored),
            AppendResult::AlreadyExists => Ok(IngestOutcome::Duplicate),
            AppendResult::Conflict { existing } => Ok(IngestOutcome::Conflict { existing }),
        }
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
