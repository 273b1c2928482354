//! Replication boundary: how entries cross processes.
//!
//! Wire transport and peer discovery are external concerns. The engine
//! only requires a sink to push local appends outward and a stream of
//! new entries per feed coming inward. Signature verification happens at
//! the ingest boundary ([`crate::store::FeedStore::ingest`]) before any
//! delivered bytes reach the feed abstraction.
//!
//! The in-memory implementation here routes records between spaces inside
//! one process; it exists for tests and local multi-space setups.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use spacefold_core::{FeedKey, Signature};

use crate::error::Result;

/// Capacity of each per-feed broadcast channel.
const CHANNEL_CAPACITY: usize = 256;

/// Outward half of the replication boundary.
///
/// `payload` is the entry's signed message (canonical header || payload);
/// together with `signature` it reassembles the full canonical record.
#[async_trait]
pub trait ReplicationSink: Send + Sync {
    /// Deliver a raw signed record for a feed position.
    async fn push(
        &self,
        feed: FeedKey,
        seq: u64,
        payload: Bytes,
        signature: Signature,
    ) -> Result<()>;
}

/// In-memory replication hub.
///
/// Routes full canonical records (signed message || signature) through a
/// broadcast channel per feed. Subscribers decode records with
/// [`spacefold_core::decode_entry`].
pub struct MemoryReplication {
    channels: RwLock<HashMap<FeedKey, broadcast::Sender<Bytes>>>,
}

impl MemoryReplication {
    /// Create a new hub with no subscribers.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to new records for a feed.
    pub fn subscribe_new_entries(&self, feed: &FeedKey) -> broadcast::Receiver<Bytes> {
        self.sender(feed).subscribe()
    }

    fn sender(&self, feed: &FeedKey) -> broadcast::Sender<Bytes> {
        let mut channels = self.channels.write().expect("channels lock poisoned");
        channels
            .entry(*feed)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryReplication {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplicationSink for MemoryReplication {
    async fn push(
        &self,
        feed: FeedKey,
        _seq: u64,
        payload: Bytes,
        signature: Signature,
    ) -> Result<()> {
        let mut record = Vec::with_capacity(payload.len() + 64);
        record.extend_from_slice(&payload);
        record.extend_from_slice(&signature.0);

        // A send error just means nobody is listening yet.
        let _ = self.sender(&feed).send(record.into());
        Ok(())
    }
}
