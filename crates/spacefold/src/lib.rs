//! # spacefold
//!
//! A multi-writer append-only log synchronization and object
//! materialization engine.
//!
//! ## Overview
//!
//! A spacefold **space** is a shared, replicated object graph. Each
//! writer (device) appends signed mutations to its own single-writer
//! feed; feeds are merged into one causally ordered stream; a credential
//! authority decides — from a stream of signed credentials — which
//! writers are currently admitted; and the admitted mutations are folded
//! into live objects through pluggable per-type models.
//!
//! ## Key Concepts
//!
//! - **Feed**: a single-writer append-only signed log, identified by the
//!   writer's public key. Entries are immutable once appended.
//! - **Timeframe**: per-feed highest-consumed-seq marker. The engine's
//!   dedup and causal bookkeeping.
//! - **Credential**: a signed admission assertion. Revocation is itself a
//!   credential; nothing is retracted implicitly.
//! - **Genesis mutation**: the first mutation for an object id creates
//!   the item; later updates fold through the item's model.
//! - **Result set**: a reactive, predicate-filtered read view.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spacefold::{Space, SpaceConfig};
//! use spacefold::core::Keypair;
//! use spacefold::engine::{record_payload, ModelRegistry};
//! use ciborium::value::Value;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let keypair = Keypair::generate();
//!     let registry = ModelRegistry::with_defaults();
//!
//!     let space = Space::open(
//!         keypair,
//!         "notes",
//!         "/var/lib/spacefold/notes",
//!         registry,
//!         SpaceConfig::default(),
//!     )
//!     .await?;
//!
//!     let id = space
//!         .create_object(
//!             "record",
//!             record_payload([("title", Value::Text("hello".into()))]),
//!         )
//!         .await?;
//!
//!     let item = space.wait_for_item(id, |item| item.is_live()).await?;
//!     println!("materialized {:?}", item.id);
//!
//!     space.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! The component crates are re-exported for convenience:
//!
//! - `spacefold::core` - entries, timeframes, mutation batches, crypto
//! - `spacefold::feed` - feed storage, process lock, replication boundary
//! - `spacefold::auth` - credentials and the credential authority
//! - `spacefold::engine` - demuxer, item manager, models, result sets

pub mod error;
pub mod space;

// Re-export component crates
pub use spacefold_auth as auth;
pub use spacefold_core as core;
pub use spacefold_engine as engine;
pub use spacefold_feed as feed;

// Re-export main types for convenience
pub use error::{Result, SpaceError};
pub use space::{Space, SpaceConfig};

// Re-export commonly used component types
pub use spacefold_auth::{AssertionKind, Credential, CredentialAuthority};
pub use spacefold_core::{
    EntryBuilder, EntryKind, FeedEntry, FeedKey, Keypair, MutationBatch, MutationOp, ObjectId,
    PublicKey, Signature, SpaceId, Timeframe,
};
pub use spacefold_engine::{
    DemuxConfig, DemuxStats, Item, ItemEvent, ItemManager, Model, ModelRegistry, ResultSet,
};
pub use spacefold_feed::{
    FeedStorage, FeedStore, IngestOutcome, MemoryFeedStorage, ProcessLock, SqliteFeedStorage,
};
