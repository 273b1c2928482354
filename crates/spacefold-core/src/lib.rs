//! # spacefold-core
//!
//! Pure primitives for spacefold: signed feed entries, timeframes, mutation
//! batches, and canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`FeedEntry`] - The atomic record of a single-writer append-only feed
//! - [`FeedKey`] - A feed is identified by its writer's public key
//! - [`Timeframe`] - Per-feed highest-consumed-sequence causal marker
//! - [`MutationBatch`] - The object mutations carried by one entry
//! - [`EntryKind`] - Discriminator for payload interpretation
//!
//! ## Canonicalization
//!
//! All entries are encoded using deterministic CBOR. See [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod mutation;
pub mod timeframe;
pub mod types;
pub mod validation;

pub use canonical::{canonical_entry_bytes, canonical_header_bytes, decode_entry, signed_message};
pub use crypto::{Blake3Hash, FeedKey, Keypair, PublicKey, Signature};
pub use entry::{EntryBuilder, EntryHeader, EntryKind, FeedEntry, ENTRY_VERSION};
pub use error::{CoreError, ValidationError};
pub use mutation::{MutationBatch, MutationOp, ObjectMutation};
pub use timeframe::{Timeframe, TimeframeOrd};
pub use types::{ObjectId, SpaceId};
pub use validation::{validate_entry, validate_entry_structure};
