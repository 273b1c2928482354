//! Feed entry: the atomic record of a feed.
//!
//! A feed is a single-writer, append-only log of signed entries. Once
//! appended an entry is immutable; changes are represented as new entries.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_entry_bytes;
use crate::crypto::{Blake3Hash, FeedKey, Keypair, PublicKey, Signature};
use crate::types::SpaceId;

/// The current entry schema version.
pub const ENTRY_VERSION: u8 = 0;

/// The kind of entry, determining how the payload is interpreted.
///
/// The kind space is open: consumers skip kinds they do not understand
/// instead of rejecting the entry, so old readers tolerate new writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", from = "u16")]
pub enum EntryKind {
    /// Payload is a canonical-CBOR mutation batch.
    Mutation,
    /// Payload is a canonical-CBOR authorization credential.
    Credential,
    /// Kind minted by a newer writer; carried but not interpreted.
    Unknown(u16),
}

impl EntryKind {
    /// Convert to u16 for serialization.
    pub fn to_u16(self) -> u16 {
        match self {
            EntryKind::Mutation => 0x0001,
            EntryKind::Credential => 0x0100,
            EntryKind::Unknown(v) => v,
        }
    }

    /// Parse from u16. Total: unrecognized values map to `Unknown`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => Self::Mutation,
            0x0100 => Self::Credential,
            other => Self::Unknown(other),
        }
    }

    /// Check if this is a mutation entry.
    pub fn is_mutation(self) -> bool {
        matches!(self, EntryKind::Mutation)
    }

    /// Check if this is a credential entry.
    pub fn is_credential(self) -> bool {
        matches!(self, EntryKind::Credential)
    }
}

impl From<EntryKind> for u16 {
    fn from(kind: EntryKind) -> u16 {
        kind.to_u16()
    }
}

impl From<u16> for EntryKind {
    fn from(value: u16) -> EntryKind {
        EntryKind::from_u16(value)
    }
}

/// The header of a feed entry, containing all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    /// Schema version (currently 0).
    pub version: u8,

    /// The writer's public key — also the feed identifier (32 bytes).
    pub author: PublicKey,

    /// The space this entry belongs to (32 bytes).
    pub space_id: SpaceId,

    /// Sequence number within the feed (0-indexed, strictly increasing).
    pub seq: u64,

    /// Author-claimed timestamp (Unix milliseconds). Untrusted.
    pub timestamp: i64,

    /// The kind of entry.
    pub kind: EntryKind,

    /// Blake3 hash of the payload bytes.
    pub payload_hash: Blake3Hash,
}

/// A complete feed entry: header + payload + signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// The entry header.
    pub header: EntryHeader,

    /// The payload bytes.
    pub payload: Bytes,

    /// Ed25519 signature over (canonical_header || payload).
    pub signature: Signature,
}

impl FeedEntry {
    /// Compute the content hash of this entry (Blake3 of canonical bytes).
    ///
    /// Used for conflict detection: two different entries at the same
    /// `(feed, seq)` slot hash differently.
    pub fn content_hash(&self) -> Blake3Hash {
        Blake3Hash::hash(&canonical_entry_bytes(self))
    }

    /// Get the feed this entry belongs to (the writer's key).
    pub fn feed_key(&self) -> &FeedKey {
        &self.header.author
    }

    /// Get the space ID.
    pub fn space_id(&self) -> &SpaceId {
        &self.header.space_id
    }

    /// Get the sequence number.
    pub fn seq(&self) -> u64 {
        self.header.seq
    }

    /// Get the entry kind.
    pub fn kind(&self) -> EntryKind {
        self.header.kind
    }

    /// The entry's position: its dedup identity within a space.
    pub fn position(&self) -> (FeedKey, u64) {
        (self.header.author, self.header.seq)
    }
}

/// Builder for creating signed feed entries.
pub struct EntryBuilder {
    author: PublicKey,
    space_id: SpaceId,
    seq: u64,
    timestamp: i64,
    kind: EntryKind,
    payload: Bytes,
}

impl EntryBuilder {
    /// Start building an entry.
    pub fn new(author: PublicKey, space_id: SpaceId, seq: u64) -> Self {
        Self {
            author,
            space_id,
            seq,
            timestamp: 0,
            kind: EntryKind::Mutation,
            payload: Bytes::new(),
        }
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the kind.
    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the payload.
    pub fn payload(mut self, p: impl Into<Bytes>) -> Self {
        self.payload = p.into();
        self
    }

    /// Build and sign the entry.
    pub fn sign(self, keypair: &Keypair) -> FeedEntry {
        let payload_hash = Blake3Hash::hash(&self.payload);

        let header = EntryHeader {
            version: ENTRY_VERSION,
            author: self.author,
            space_id: self.space_id,
            seq: self.seq,
            timestamp: self.timestamp,
            kind: self.kind,
            payload_hash,
        };

        // Sign: canonical_header || payload
        let mut message = crate::canonical::canonical_header_bytes(&header);
        message.extend_from_slice(&self.payload);
        let signature = keypair.sign(&message);

        FeedEntry {
            header,
            payload: self.payload,
            signature,
        }
    }
}
