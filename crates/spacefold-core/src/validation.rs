//! Entry validation: signature verification and structural checks.

use crate::canonical::signed_message;
use crate::crypto::Blake3Hash;
use crate::entry::{EntryKind, FeedEntry, ENTRY_VERSION};
use crate::error::ValidationError;
use crate::mutation::MutationBatch;

/// Validate an entry's structure and signature.
///
/// This performs:
/// - Version check
/// - Payload hash verification
/// - Mutation payloads must decode as a batch
/// - Signature verification
///
/// Credential payloads are decoded by the credential authority, not here;
/// unknown kinds pass validation so newer writers don't wedge old readers.
pub fn validate_entry(entry: &FeedEntry) -> Result<(), ValidationError> {
    validate_entry_structure(entry)?;

    // Verify signature last (the expensive check)
    let message = signed_message(entry);
    entry
        .header
        .author
        .verify(&message, &entry.signature)
        .map_err(|_| ValidationError::SignatureFailed)?;

    Ok(())
}

/// Validate entry structure without signature verification.
///
/// Useful when the entry is known to be signature-checked already
/// (e.g., read back from trusted local storage).
pub fn validate_entry_structure(entry: &FeedEntry) -> Result<(), ValidationError> {
    // 1. Check version
    if entry.header.version != ENTRY_VERSION {
        return Err(ValidationError::UnsupportedVersion(entry.header.version));
    }

    // 2. Verify payload hash
    let computed_hash = Blake3Hash::hash(&entry.payload);
    if computed_hash != entry.header.payload_hash {
        return Err(ValidationError::PayloadHashMismatch);
    }

    // 3. Mutation payloads must decode
    if entry.header.kind == EntryKind::Mutation {
        MutationBatch::from_bytes(&entry.payload)
            .map_err(|e| ValidationError::MalformedBatch(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Keypair, Signature};
    use crate::entry::EntryBuilder;
    use crate::types::{ObjectId, SpaceId};

    fn make_test_keypair() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    fn batch_payload() -> Vec<u8> {
        MutationBatch::genesis(ObjectId::from_bytes([1; 32]), "register", b"x".to_vec())
            .to_bytes()
    }

    #[test]
    fn test_valid_mutation_entry() {
        let keypair = make_test_keypair();
        let space_id = SpaceId::derive(&keypair.public_key(), "test");

        let entry = EntryBuilder::new(keypair.public_key(), space_id, 0)
            .timestamp(1736870400000)
            .kind(EntryKind::Mutation)
            .payload(batch_payload())
            .sign(&keypair);

        assert!(validate_entry(&entry).is_ok());
    }

    #[test]
    fn test_invalid_signature() {
        let keypair = make_test_keypair();
        let space_id = SpaceId::derive(&keypair.public_key(), "test");

        let mut entry = EntryBuilder::new(keypair.public_key(), space_id, 0)
            .timestamp(1736870400000)
            .kind(EntryKind::Mutation)
            .payload(batch_payload())
            .sign(&keypair);

        // Tamper with signature
        entry.signature = Signature::from_bytes([0xff; 64]);

        let result = validate_entry(&entry);
        assert!(matches!(result, Err(ValidationError::SignatureFailed)));
    }

    #[test]
    fn test_payload_hash_mismatch() {
        let keypair = make_test_keypair();
        let space_id = SpaceId::derive(&keypair.public_key(), "test");

        let mut entry = EntryBuilder::new(keypair.public_key(), space_id, 0)
            .timestamp(1736870400000)
            .kind(EntryKind::Mutation)
            .payload(batch_payload())
            .sign(&keypair);

        // Tamper with payload
        entry.payload = b"tampered".to_vec().into();

        let result = validate_entry(&entry);
        assert!(matches!(result, Err(ValidationError::PayloadHashMismatch)));
    }

    #[test]
    fn test_mutation_payload_must_decode() {
        let keypair = make_test_keypair();
        let space_id = SpaceId::derive(&keypair.public_key(), "test");

        let entry = EntryBuilder::new(keypair.public_key(), space_id, 0)
            .timestamp(1736870400000)
            .kind(EntryKind::Mutation)
            .payload(b"not a batch".to_vec())
            .sign(&keypair);

        let result = validate_entry(&entry);
        assert!(matches!(result, Err(ValidationError::MalformedBatch(_))));
    }

    #[test]
    fn test_unknown_kind_is_valid() {
        let keypair = make_test_keypair();
        let space_id = SpaceId::derive(&keypair.public_key(), "test");

        let entry = EntryBuilder::new(keypair.public_key(), space_id, 0)
            .timestamp(1736870400000)
            .kind(EntryKind::Unknown(0x9999))
            .payload(b"opaque".to_vec())
            .sign(&keypair);

        assert!(validate_entry(&entry).is_ok());
    }

    #[test]
    fn test_structure_only_skips_signature() {
        let keypair = make_test_keypair();
        let space_id = SpaceId::derive(&keypair.public_key(), "test");

        let mut entry = EntryBuilder::new(keypair.public_key(), space_id, 0)
            .timestamp(1736870400000)
            .kind(EntryKind::Mutation)
            .payload(batch_payload())
            .sign(&keypair);

        entry.signature = Signature::from_bytes([0xff; 64]);

        assert!(validate_entry_structure(&entry).is_ok());
        assert!(validate_entry(&entry).is_err());
    }
}
