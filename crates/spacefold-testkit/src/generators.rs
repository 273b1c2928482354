//! Proptest generators for property-based testing.

use proptest::prelude::*;

use spacefold_core::{
    Blake3Hash, EntryBuilder, EntryKind, FeedEntry, Keypair, MutationBatch, MutationOp, ObjectId,
    ObjectMutation, PublicKey, SpaceId, Timeframe,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random ObjectId.
pub fn object_id() -> impl Strategy<Value = ObjectId> {
    any::<[u8; 32]>().prop_map(ObjectId::from_bytes)
}

/// Generate a random SpaceId.
pub fn space_id() -> impl Strategy<Value = SpaceId> {
    any::<[u8; 32]>().prop_map(SpaceId::from_bytes)
}

/// Generate a random Blake3Hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash::from_bytes)
}

/// Generate a random public key (derived from a real keypair).
pub fn public_key() -> impl Strategy<Value = PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a valid sequence number (0-indexed).
pub fn seq() -> impl Strategy<Value = u64> {
    0u64..=u64::MAX / 2
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}

/// Generate an EntryKind, including unknown tags.
pub fn entry_kind() -> impl Strategy<Value = EntryKind> {
    prop_oneof![
        Just(EntryKind::Mutation),
        Just(EntryKind::Credential),
        any::<u16>().prop_map(EntryKind::from_u16),
    ]
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a model type string.
pub fn model_type() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}".prop_map(String::from)
}

/// Generate a single object mutation.
pub fn object_mutation() -> impl Strategy<Value = ObjectMutation> {
    (object_id(), mutation_op()).prop_map(|(object_id, op)| ObjectMutation { object_id, op })
}

/// Generate a mutation op.
pub fn mutation_op() -> impl Strategy<Value = MutationOp> {
    prop_oneof![
        (model_type(), payload(64)).prop_map(|(model_type, payload)| MutationOp::Genesis {
            model_type,
            payload: payload.into(),
        }),
        payload(64).prop_map(|payload| MutationOp::Update {
            payload: payload.into(),
        }),
        Just(MutationOp::Delete),
    ]
}

/// Generate a mutation batch with up to `max` mutations.
pub fn mutation_batch(max: usize) -> impl Strategy<Value = MutationBatch> {
    prop::collection::vec(object_mutation(), 0..=max)
        .prop_map(|objects| MutationBatch { objects })
}

/// Generate a timeframe over up to `max_feeds` feeds.
pub fn timeframe(max_feeds: usize) -> impl Strategy<Value = Timeframe> {
    prop::collection::vec((any::<[u8; 32]>(), 0u64..1_000), 0..=max_feeds).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(key, seq)| (PublicKey::from_bytes(key), seq))
            .collect()
    })
}

/// Parameters for generating a signed entry.
#[derive(Debug, Clone)]
pub struct EntryParams {
    pub seed: [u8; 32],
    pub space_name: String,
    pub seq: u64,
    pub kind: EntryKind,
    pub timestamp: i64,
    pub payload: Vec<u8>,
}

impl Arbitrary for EntryParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: ()) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            "[a-z][a-z0-9-]{0,15}",
            seq(),
            entry_kind(),
            timestamp(),
            payload(128),
        )
            .prop_map(
                |(seed, space_name, seq, kind, timestamp, payload)| EntryParams {
                    seed,
                    space_name,
                    seq,
                    kind,
                    timestamp,
                    payload,
                },
            )
            .boxed()
    }
}

/// Build a signed entry from generated parameters.
pub fn entry_from_params(params: &EntryParams) -> FeedEntry {
    let keypair = Keypair::from_seed(&params.seed);
    let space_id = SpaceId::derive(&keypair.public_key(), &params.space_name);

    EntryBuilder::new(keypair.public_key(), space_id, params.seq)
        .kind(params.kind)
        .timestamp(params.timestamp)
        .payload(params.payload.clone())
        .sign(&keypair)
}
