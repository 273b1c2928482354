//! FeedStorage trait: the abstract interface for entry persistence.
//!
//! This trait keeps the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use spacefold_core::{Blake3Hash, FeedEntry, FeedKey, SpaceId};

use crate::error::Result;

/// Result of appending an entry to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendResult {
    /// Entry was persisted.
    Appended,
    /// The exact same entry already occupies this position (idempotent).
    AlreadyExists,
    /// A different entry occupies this position.
    Conflict {
        /// Content hash of the existing entry at this position.
        existing: Blake3Hash,
    },
}

/// Metadata describing one feed known to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMeta {
    /// The feed's key (its writer's public key).
    pub key: FeedKey,
    /// The space the feed belongs to.
    pub space_id: SpaceId,
    /// Whether this process holds the signing key for the feed.
    pub writable: bool,
}

/// Async interface for entry persistence.
///
/// # Design Notes
///
/// - **Idempotent appends**: Appending the same entry twice returns
///   `AlreadyExists`.
/// - **Conflict detection**: A different entry at an occupied position
///   returns `Conflict` with the existing entry's content hash.
/// - **Durability**: `append_entry` must not return before the entry is
///   durably persisted — a process restart must not lose it.
/// - **Corrupt-record tolerance**: `entries_range` skips entries that fail
///   to decode (logged at warn) so one bad record does not halt
///   consumption of an otherwise healthy feed.
#[async_trait]
pub trait FeedStorage: Send + Sync {
    /// Persist an entry.
    ///
    /// `canonical` is the entry's canonical encoding, passed in to avoid
    /// recomputation (it was already built for signing or verification).
    async fn append_entry(&self, entry: &FeedEntry, canonical: &[u8]) -> Result<AppendResult>;

    /// Get the entry at a feed position, if present.
    async fn entry_at(&self, feed: &FeedKey, seq: u64) -> Result<Option<FeedEntry>>;

    /// Get entries with `from <= seq < to`, ordered by seq.
    ///
    /// The result is finite and bounded by feed content at call time.
    /// Positions that are absent (not yet replicated) or corrupt are
    /// simply missing from the result.
    async fn entries_range(&self, feed: &FeedKey, from: u64, to: u64) -> Result<Vec<FeedEntry>>;

    /// The feed's length: one past the highest stored seq (0 if empty).
    ///
    /// Out-of-order replication means positions below this may be absent.
    async fn feed_len(&self, feed: &FeedKey) -> Result<u64>;

    /// Insert or update feed metadata.
    async fn upsert_feed(&self, meta: &FeedMeta) -> Result<()>;

    /// Get feed metadata by key.
    async fn feed(&self, key: &FeedKey) -> Result<Option<FeedMeta>>;

    /// List all feeds known to the store.
    async fn list_feeds(&self) -> Result<Vec<FeedMeta>>;
}
