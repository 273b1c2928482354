//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: deterministic writers that
//! share a space and sign well-formed entries.

use spacefold_auth::{AssertionKind, Credential};
use spacefold_core::{
    EntryBuilder, EntryKind, FeedEntry, Keypair, MutationBatch, PublicKey, SpaceId,
};

/// A writer in a test space: a keypair plus the space it writes into.
pub struct TestWriter {
    pub keypair: Keypair,
    pub space_id: SpaceId,
}

impl TestWriter {
    /// The space name every fixture-created space uses.
    pub const SPACE_NAME: &'static str = "test-space";

    /// A founding writer with a random keypair. Its key derives the
    /// space id, so it doubles as the space identity.
    pub fn founder() -> Self {
        Self::founder_with_seed(rand_seed())
    }

    /// A founding writer with a deterministic keypair.
    pub fn founder_with_seed(seed: [u8; 32]) -> Self {
        let keypair = Keypair::from_seed(&seed);
        let space_id = SpaceId::derive(&keypair.public_key(), Self::SPACE_NAME);
        Self { keypair, space_id }
    }

    /// Another writer in an existing space.
    pub fn join(space_id: SpaceId, seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            space_id,
        }
    }

    /// The writer's public key (its feed key).
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Create a signed mutation entry at a feed position.
    pub fn make_mutation(&self, seq: u64, batch: &MutationBatch) -> FeedEntry {
        EntryBuilder::new(self.keypair.public_key(), self.space_id, seq)
            .kind(EntryKind::Mutation)
            .timestamp(base_timestamp() + seq as i64)
            .payload(batch.to_bytes())
            .sign(&self.keypair)
    }

    /// Create a signed credential entry at a feed position.
    pub fn make_credential_entry(&self, seq: u64, credential: &Credential) -> FeedEntry {
        EntryBuilder::new(self.keypair.public_key(), self.space_id, seq)
            .kind(EntryKind::Credential)
            .timestamp(base_timestamp() + seq as i64)
            .payload(credential.to_bytes())
            .sign(&self.keypair)
    }

    /// Issue a credential admitting another writer's device key.
    pub fn admit(&self, subject: PublicKey) -> Credential {
        Credential::issue(&self.keypair, subject, AssertionKind::AuthorizedDevice)
    }

    /// Issue a credential revoking another writer's device key.
    pub fn revoke(&self, subject: PublicKey) -> Credential {
        Credential::issue(&self.keypair, subject, AssertionKind::RevokeDevice)
    }
}

/// A founder plus `count` additional writers sharing its space.
pub fn multi_writer_fixtures(count: usize) -> (TestWriter, Vec<TestWriter>) {
    let founder = TestWriter::founder_with_seed([0xF0; 32]);
    let writers = (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8 + 1;
            TestWriter::join(founder.space_id, seed)
        })
        .collect();
    (founder, writers)
}

fn rand_seed() -> [u8; 32] {
    Keypair::generate().seed()
}

fn base_timestamp() -> i64 {
    1736870400000 // 2025-01-14T16:00:00Z
}
