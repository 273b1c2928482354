//! Golden test vectors for deterministic verification.
//!
//! These vectors pin down the canonical entry encoding: any other
//! implementation fed the same seeds and payloads must produce the same
//! bytes and hashes.

use serde::{Deserialize, Serialize};

use spacefold_core::{
    canonical_entry_bytes, decode_entry, signed_message, EntryBuilder, EntryKind, FeedEntry,
    Keypair, SpaceId,
};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed for deterministic key generation.
    pub seed: [u8; 32],
    /// Space name (space id derives from seed + name).
    pub space_name: &'static str,
    /// Sequence number.
    pub seq: u64,
    /// Entry kind.
    pub kind: EntryKind,
    /// Payload bytes.
    pub payload: &'static [u8],
    /// Timestamp.
    pub timestamp: i64,
    /// Expected content hash (hex). Empty until pinned from a reference
    /// run; determinism and roundtrip are verified regardless.
    pub expected_content_hash: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "mutation entry with short payload",
            seed: [0x42; 32],
            space_name: "golden",
            seq: 0,
            kind: EntryKind::Mutation,
            payload: b"hello",
            timestamp: 1736870400000, // 2025-01-14T16:00:00Z
            expected_content_hash: "",
        },
        GoldenVector {
            name: "credential entry",
            seed: [0x42; 32],
            space_name: "golden",
            seq: 1,
            kind: EntryKind::Credential,
            payload: b"cred-bytes",
            timestamp: 1736870401000,
            expected_content_hash: "",
        },
        GoldenVector {
            name: "empty payload",
            seed: [0x00; 32],
            space_name: "empty",
            seq: 0,
            kind: EntryKind::Mutation,
            payload: b"",
            timestamp: 0,
            expected_content_hash: "",
        },
        GoldenVector {
            name: "unknown kind carried verbatim",
            seed: [0x07; 32],
            space_name: "forward",
            seq: 42,
            kind: EntryKind::Unknown(0xBEEF),
            payload: b"opaque",
            timestamp: 1736870402000,
            expected_content_hash: "",
        },
    ]
}

/// Build the entry described by a vector.
pub fn entry_from_vector(vector: &GoldenVector) -> FeedEntry {
    let keypair = Keypair::from_seed(&vector.seed);
    let space_id = SpaceId::derive(&keypair.public_key(), vector.space_name);

    EntryBuilder::new(keypair.public_key(), space_id, vector.seq)
        .kind(vector.kind)
        .timestamp(vector.timestamp)
        .payload(vector.payload.to_vec())
        .sign(&keypair)
}

/// Verify every vector: deterministic bytes, decode roundtrip, and the
/// pinned hash where one is recorded.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let entry = entry_from_vector(&vector);

        let bytes_a = canonical_entry_bytes(&entry);
        let bytes_b = canonical_entry_bytes(&entry_from_vector(&vector));
        if bytes_a != bytes_b {
            return Err(format!("{}: encoding not deterministic", vector.name));
        }

        let decoded = decode_entry(&bytes_a)
            .map_err(|e| format!("{}: decode failed: {}", vector.name, e))?;
        if decoded != entry {
            return Err(format!("{}: roundtrip mismatch", vector.name));
        }

        if !vector.expected_content_hash.is_empty() {
            let hash = entry.content_hash().to_hex();
            if hash != vector.expected_content_hash {
                return Err(format!(
                    "{}: content hash mismatch: expected {}, got {}",
                    vector.name, vector.expected_content_hash, hash
                ));
            }
        }
    }
    Ok(())
}

/// A vector fully expanded to hex, for export to other implementations.
///
/// Every implementation of the entry format must reproduce these outputs
/// byte for byte from the same inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorReport {
    pub name: String,

    // Inputs
    pub seed: String,       // 32 bytes hex
    pub author: String,     // 32 bytes hex (derived)
    pub space_name: String,
    pub seq: u64,
    pub kind: u16,
    pub timestamp: i64,
    pub payload: String, // hex

    // Derived outputs (all hex)
    pub signed_message: String,
    pub signature: String, // 64 bytes
    pub entry_bytes: String,
    pub content_hash: String, // 32 bytes
}

/// Expand a vector into its report form.
pub fn report_vector(vector: &GoldenVector) -> VectorReport {
    let keypair = Keypair::from_seed(&vector.seed);
    let entry = entry_from_vector(vector);

    VectorReport {
        name: vector.name.to_string(),
        seed: hex::encode(vector.seed),
        author: keypair.public_key().to_hex(),
        space_name: vector.space_name.to_string(),
        seq: vector.seq,
        kind: vector.kind.to_u16(),
        timestamp: vector.timestamp,
        payload: hex::encode(vector.payload),
        signed_message: hex::encode(signed_message(&entry)),
        signature: entry.signature.to_hex(),
        entry_bytes: hex::encode(canonical_entry_bytes(&entry)),
        content_hash: entry.content_hash().to_hex(),
    }
}

/// All vectors as a JSON document, for export to other implementations.
pub fn vectors_to_json() -> String {
    let reports: Vec<VectorReport> = all_vectors().iter().map(report_vector).collect();
    serde_json::to_string_pretty(&reports).expect("vector reports serialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_verify() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_vector_report_json_roundtrip() {
        let json = vectors_to_json();
        let reports: Vec<VectorReport> = serde_json::from_str(&json).unwrap();
        assert_eq!(reports.len(), all_vectors().len());
        assert_eq!(reports[0].entry_bytes.len() % 2, 0);
    }

    #[test]
    fn test_vectors_are_distinct() {
        let hashes: Vec<String> = all_vectors()
            .iter()
            .map(|v| entry_from_vector(v).content_hash().to_hex())
            .collect();

        for (i, a) in hashes.iter().enumerate() {
            for b in hashes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
