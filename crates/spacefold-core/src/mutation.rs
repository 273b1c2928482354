//! Mutation batch payloads.
//!
//! A mutation entry's payload is a batch of object mutations. The batch is
//! the unit of admission and delivery: either every mutation in it reaches
//! the materialization layer, or none does.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::ObjectId;

/// A batch of object mutations carried by one feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationBatch {
    /// The mutations, applied in order.
    pub objects: Vec<ObjectMutation>,
}

/// A single mutation addressed to one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMutation {
    /// The object being mutated.
    pub object_id: ObjectId,

    /// What to do to it.
    pub op: MutationOp,
}

/// The operation carried by a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOp {
    /// Create the object. Must be the first mutation seen for its id.
    Genesis {
        /// Which registered model folds this object's mutations.
        model_type: String,
        /// Opaque initial payload, interpreted by the model.
        payload: Bytes,
    },

    /// Fold a payload into the object's current state.
    Update {
        /// Opaque payload, interpreted by the model.
        payload: Bytes,
    },

    /// Mark the object deleted. State is retained for historical queries.
    Delete,
}

impl MutationOp {
    /// Check if this is a genesis operation.
    pub fn is_genesis(&self) -> bool {
        matches!(self, MutationOp::Genesis { .. })
    }
}

impl MutationBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// A batch containing a single genesis mutation.
    pub fn genesis(object_id: ObjectId, model_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            objects: vec![ObjectMutation {
                object_id,
                op: MutationOp::Genesis {
                    model_type: model_type.into(),
                    payload: payload.into(),
                },
            }],
        }
    }

    /// A batch containing a single update mutation.
    pub fn update(object_id: ObjectId, payload: impl Into<Bytes>) -> Self {
        Self {
            objects: vec![ObjectMutation {
                object_id,
                op: MutationOp::Update {
                    payload: payload.into(),
                },
            }],
        }
    }

    /// A batch containing a single delete mutation.
    pub fn delete(object_id: ObjectId) -> Self {
        Self {
            objects: vec![ObjectMutation {
                object_id,
                op: MutationOp::Delete,
            }],
        }
    }

    /// Append a mutation to the batch.
    pub fn push(&mut self, object_id: ObjectId, op: MutationOp) -> &mut Self {
        self.objects.push(ObjectMutation { object_id, op });
        self
    }

    /// Number of mutations in the batch.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if the batch carries no mutations.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(bytes)
    }
}

impl Default for MutationBatch {
    fn default() -> Self {
        Self::new()
    }
}
