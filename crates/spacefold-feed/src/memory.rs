//! In-memory implementation of the FeedStorage trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use spacefold_core::{FeedEntry, FeedKey};

use crate::error::Result;
use crate::traits::{AppendResult, FeedMeta, FeedStorage};

/// In-memory feed storage.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryFeedStorage {
    inner: RwLock<MemoryInner>,
}

struct MemoryInner {
    /// Entries indexed by position; BTreeMap gives ordered range scans.
    entries: BTreeMap<(FeedKey, u64), StoredEntry>,

    /// Feed metadata.
    feeds: HashMap<FeedKey, FeedMeta>,
}

struct StoredEntry {
    entry: FeedEntry,
    canonical: Vec<u8>,
}

impl MemoryFeedStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                entries: BTreeMap::new(),
                feeds: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryFeedStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedStorage for MemoryFeedStorage {
    async fn append_entry(&self, entry: &FeedEntry, canonical: &[u8]) -> Result<AppendResult> {
        let mut inner = self.inner.write().unwrap();

        let position = entry.position();

        if let Some(existing) = inner.entries.get(&position) {
            if existing.canonical == canonical {
                return Ok(AppendResult::AlreadyExists);
            }
            return Ok(AppendResult::Conflict {
                existing: existing.entry.content_hash(),
            });
        }

        inner.entries.insert(
            position,
            StoredEntry {
                entry: entry.clone(),
                canonical: canonical.to_vec(),
            },
        );

        Ok(AppendResult::Appended)
    }

    async fn entry_at(&self, feed: &FeedKey, seq: u64) -> Result<Option<FeedEntry>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.entries.get(&(*feed, seq)).map(|se| se.entry.clone()))
    }

    async fn entries_range(&self, feed: &FeedKey, from: u64, to: u64) -> Result<Vec<FeedEntry>> {
        let inner = self.inner.read().unwrap();

        let entries = inner
            .entries
            .range((*feed, from)..(*feed, to.max(from)))
            .map(|(_, se)| se.entry.clone())
            .collect();

        Ok(entries)
    }

    async fn feed_len(&self, feed: &FeedKey) -> Result<u64> {
        let inner = self.inner.read().unwrap();

        let len = inner
            .entries
            .range((*feed, 0)..=(*feed, u64::MAX))
            .next_back()
            .map(|((_, seq), _)| seq + 1)
            .unwrap_or(0);

        Ok(len)
    }

    async fn upsert_feed(&self, meta: &FeedMeta) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.feeds.insert(meta.key, meta.clone());
        Ok(())
    }

    async fn feed(&self, key: &FeedKey) -> Result<Option<FeedMeta>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.feeds.get(key).cloned())
    }

    async fn list_feeds(&self) -> Result<Vec<FeedMeta>> {
        let inner = self.inner.read().unwrap();
        let mut feeds: Vec<FeedMeta> = inner.feeds.values().cloned().collect();
        feeds.sort_by_key(|m| m.key);
        Ok(feeds)
    }
}
