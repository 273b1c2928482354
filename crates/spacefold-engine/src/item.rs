//! Items: materialized object instances.

use spacefold_core::{FeedKey, ObjectId};

use crate::model::StateValue;

/// A materialized object owned by the item manager.
///
/// Created only on a genesis mutation; mutated only by folding accepted
/// mutations through its model. Deletion is logical: state is retained
/// for historical queries, nothing is physically removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// The object's identity.
    pub id: ObjectId,

    /// The registered model that folds this object's mutations.
    pub model_type: String,

    /// Opaque state owned by the model.
    pub state: StateValue,

    /// Logical deletion flag.
    pub deleted: bool,

    /// The feed position whose genesis mutation created this item.
    pub genesis_frame: (FeedKey, u64),
}

impl Item {
    /// Whether the item is live (not logically deleted).
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Change notification emitted by the item manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    /// A genesis mutation created the item.
    Created(ObjectId),
    /// An update mutation changed the item's state.
    Updated(ObjectId),
    /// A delete mutation marked the item deleted.
    Deleted(ObjectId),
}

impl ItemEvent {
    /// The object the event is about.
    pub fn object_id(&self) -> ObjectId {
        match self {
            ItemEvent::Created(id) | ItemEvent::Updated(id) | ItemEvent::Deleted(id) => *id,
        }
    }
}
