//! # spacefold-feed
//!
//! Feed storage for spacefold. Provides a trait-based interface for entry
//! persistence with SQLite and in-memory implementations, the FeedStore
//! that owns a space's set of feeds, and the replication ingest boundary.
//!
//! ## Overview
//!
//! A feed is a single-writer, append-only log identified by its writer's
//! public key. The store keeps feeds durable ([`SqliteFeedStorage`]),
//! hands out writable handles only for locally held keys, and verifies
//! signatures on replication-delivered entries before storing them.
//!
//! ## Key Types
//!
//! - [`FeedStorage`] - The async trait for all storage operations
//! - [`SqliteFeedStorage`] - SQLite-based persistent storage
//! - [`MemoryFeedStorage`] - In-memory storage for tests
//! - [`FeedStore`] - A space's feeds, indexed by key
//! - [`ProcessLock`] - Cross-process single-writer enforcement
//! - [`ReplicationSink`] / [`MemoryReplication`] - the transport boundary
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: Appending the same entry twice returns
//!   `AlreadyExists`
//! - **Conflict detection**: Different entry at same position returns
//!   `Conflict`
//! - **Corrupt-record tolerance**: one bad record is skipped at warn, it
//!   never halts consumption of the rest of the feed
//! - **Durability**: appends reach disk before returning

pub mod error;
pub mod lock;
pub mod memory;
pub mod migration;
pub mod replication;
pub mod sqlite;
pub mod store;
pub mod traits;

pub use error::{FeedError, Result};
pub use lock::ProcessLock;
pub use memory::MemoryFeedStorage;
pub use replication::{MemoryReplication, ReplicationSink};
pub use sqlite::SqliteFeedStorage;
pub use store::{Feed, FeedStore, IngestOutcome};
pub use traits::{AppendResult, FeedMeta, FeedStorage};
