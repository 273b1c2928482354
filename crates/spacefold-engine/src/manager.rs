//! The item manager: sole writer of materialized state.
//!
//! The manager owns the in-memory object graph. It creates items on
//! genesis mutations, folds updates through the matching model, and
//! tracks logical deletion. Its state transitions are not safe under
//! concurrent apply — the demuxer serializes delivery, one apply in
//! flight at a time per space.
//!
//! Semantic rejections here are deliberately non-fatal: one misbehaving
//! or stale writer must not stall the whole space. They are logged and
//! counted, and the object graph is left untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use spacefold_core::{FeedKey, MutationOp, ObjectId, ObjectMutation};

use crate::item::{Item, ItemEvent};
use crate::model::ModelRegistry;

/// Capacity of the change-event channel.
const EVENT_CAPACITY: usize = 1024;

/// Outcome of applying one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new item was created.
    Created,
    /// An existing item's state changed.
    Updated,
    /// An item was marked deleted.
    Deleted,
    /// The mutation was dropped without touching the graph.
    Rejected(RejectReason),
}

/// Why a mutation was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Genesis for an object id that already exists.
    DuplicateGenesis,
    /// Update or delete for an object id never seen. Indicates an
    /// out-of-order genesis upstream — a data-integrity condition worth
    /// more attention than a plain duplicate.
    OrphanedMutation,
    /// Genesis names a model type with no registered model.
    UnknownModel(String),
    /// Update addressed to a logically deleted item.
    ItemDeleted,
    /// The model could not interpret the payload.
    Model(String),
}

/// Owns the object graph of one space.
pub struct ItemManager {
    items: HashMap<ObjectId, Item>,
    registry: Arc<ModelRegistry>,
    events: broadcast::Sender<ItemEvent>,
}

impl ItemManager {
    /// Create an empty manager over a model registry.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items: HashMap::new(),
            registry,
            events,
        }
    }

    /// Apply one mutation originating at `source` (feed position).
    ///
    /// Infallible by design: every failure mode is a [`Applied::Rejected`]
    /// outcome, logged at warn, with the graph unchanged.
    pub fn apply(&mut self, source: (FeedKey, u64), mutation: &ObjectMutation) -> Applied {
        let id = mutation.object_id;

        match &mutation.op {
            MutationOp::Genesis {
                model_type,
                payload,
            } => {
                if self.items.contains_key(&id) {
                    warn!(object = %id, "dropping duplicate genesis");
                    return Applied::Rejected(RejectReason::DuplicateGenesis);
                }

                let Some(model) = self.registry.get(model_type) else {
                    warn!(object = %id, model_type = %model_type, "dropping genesis for unknown model type");
                    return Applied::Rejected(RejectReason::UnknownModel(model_type.clone()));
                };

                let state = match model.genesis(payload) {
                    Ok(state) => state,
                    Err(e) => {
                        warn!(object = %id, model_type = %model_type, error = %e, "model rejected genesis payload");
                        return Applied::Rejected(RejectReason::Model(e.to_string()));
                    }
                };

                self.items.insert(
                    id,
                    Item {
                        id,
                        model_type: model_type.clone(),
                        state,
                        deleted: false,
                        genesis_frame: source,
                    },
                );
                self.emit(ItemEvent::Created(id));
                Applied::Created
            }

            MutationOp::Update { payload } => {
                let Some(item) = self.items.get_mut(&id) else {
                    // Higher severity than a duplicate: the genesis never arrived.
                    warn!(
                        object = %id,
                        feed = %source.0,
                        seq = source.1,
                        "dropping update for unknown object (out-of-order genesis?)"
                    );
                    return Applied::Rejected(RejectReason::OrphanedMutation);
                };

                if item.deleted {
                    warn!(object = %id, "dropping update for deleted object");
                    return Applied::Rejected(RejectReason::ItemDeleted);
                }

                let Some(model) = self.registry.get(&item.model_type) else {
                    warn!(object = %id, model_type = %item.model_type, "model vanished from registry");
                    return Applied::Rejected(RejectReason::UnknownModel(item.model_type.clone()));
                };

                match model.fold(item.state.clone(), payload) {
                    Ok(state) => {
                        item.state = state;
                        self.emit(ItemEvent::Updated(id));
                        Applied::Updated
                    }
                    Err(e) => {
                        warn!(object = %id, error = %e, "model rejected update payload");
                        Applied::Rejected(RejectReason::Model(e.to_string()))
                    }
                }
            }

            MutationOp::Delete => {
                let Some(item) = self.items.get_mut(&id) else {
                    warn!(object = %id, "dropping delete for unknown object");
                    return Applied::Rejected(RejectReason::OrphanedMutation);
                };

                // Logical delete only; state retained for historical queries.
                item.deleted = true;
                self.emit(ItemEvent::Deleted(id));
                Applied::Deleted
            }
        }
    }

    fn emit(&self, event: ItemEvent) {
        // A send error just means no subscribers right now.
        let _ = self.events.send(event);
    }

    /// Get an item by id (deleted items included).
    pub fn get(&self, id: &ObjectId) -> Option<&Item> {
        self.items.get(id)
    }

    /// Iterate over all items.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Number of items, deleted included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no item was ever created.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot the items matching a predicate.
    pub fn select(&self, mut predicate: impl FnMut(&Item) -> bool) -> Vec<Item> {
        let mut matched: Vec<Item> = self
            .items
            .values()
            .filter(|item| predicate(item))
            .cloned()
            .collect();
        matched.sort_by_key(|item| item.id);
        matched
    }

    /// Handle on the change-event channel, for result sets.
    pub fn events(&self) -> broadcast::Sender<ItemEvent> {
        self.events.clone()
    }
}

impl std::fmt::Debug for ItemManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemManager")
            .field("items", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{encode_payload, record_payload};
    use ciborium::value::Value;
    use spacefold_core::Keypair;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn manager() -> ItemManager {
        ItemManager::new(Arc::new(ModelRegistry::with_defaults()))
    }

    fn source() -> (FeedKey, u64) {
        (Keypair::from_seed(&[9; 32]).public_key(), 0)
    }

    fn genesis(id: ObjectId, model: &str, payload: Vec<u8>) -> ObjectMutation {
        ObjectMutation {
            object_id: id,
            op: MutationOp::Genesis {
                model_type: model.into(),
                payload: payload.into(),
            },
        }
    }

    fn update(id: ObjectId, payload: Vec<u8>) -> ObjectMutation {
        ObjectMutation {
            object_id: id,
            op: MutationOp::Update {
                payload: payload.into(),
            },
        }
    }

    #[test]
    fn test_genesis_then_update() {
        let mut mgr = manager();
        let id = ObjectId::from_bytes([1; 32]);

        let applied = mgr.apply(
            source(),
            &genesis(id, "record", record_payload([("title", text("x"))])),
        );
        assert_eq!(applied, Applied::Created);

        let applied = mgr.apply(source(), &update(id, record_payload([("title", text("y"))])));
        assert_eq!(applied, Applied::Updated);

        let item = mgr.get(&id).unwrap();
        match &item.state {
            Value::Map(entries) => {
                assert!(entries.contains(&(text("title"), text("y"))));
            }
            other => panic!("expected map state, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_genesis_rejected() {
        let mut mgr = manager();
        let id = ObjectId::from_bytes([1; 32]);

        let g = genesis(id, "register", encode_payload(&text("first")));
        assert_eq!(mgr.apply(source(), &g), Applied::Created);

        let g2 = genesis(id, "register", encode_payload(&text("second")));
        assert_eq!(
            mgr.apply(source(), &g2),
            Applied::Rejected(RejectReason::DuplicateGenesis)
        );

        // First genesis won
        assert_eq!(mgr.get(&id).unwrap().state, text("first"));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_update_before_genesis_rejected() {
        let mut mgr = manager();
        let id = ObjectId::from_bytes([2; 32]);

        let applied = mgr.apply(source(), &update(id, encode_payload(&text("x"))));
        assert_eq!(
            applied,
            Applied::Rejected(RejectReason::OrphanedMutation)
        );
        assert!(mgr.get(&id).is_none());
    }

    #[test]
    fn test_delete_is_logical() {
        let mut mgr = manager();
        let id = ObjectId::from_bytes([3; 32]);

        mgr.apply(
            source(),
            &genesis(id, "register", encode_payload(&text("v"))),
        );
        let applied = mgr.apply(
            source(),
            &ObjectMutation {
                object_id: id,
                op: MutationOp::Delete,
            },
        );
        assert_eq!(applied, Applied::Deleted);

        let item = mgr.get(&id).unwrap();
        assert!(item.deleted);
        // State retained for historical queries
        assert_eq!(item.state, text("v"));

        // Updates after deletion are dropped
        let applied = mgr.apply(source(), &update(id, encode_payload(&text("w"))));
        assert_eq!(applied, Applied::Rejected(RejectReason::ItemDeleted));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let mut mgr = manager();
        let id = ObjectId::from_bytes([4; 32]);

        let applied = mgr.apply(
            source(),
            &genesis(id, "no-such-model", encode_payload(&text("v"))),
        );
        assert_eq!(
            applied,
            Applied::Rejected(RejectReason::UnknownModel("no-such-model".into()))
        );
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_events_emitted_in_order() {
        let mut mgr = manager();
        let mut rx = mgr.events().subscribe();
        let id = ObjectId::from_bytes([5; 32]);

        mgr.apply(
            source(),
            &genesis(id, "register", encode_payload(&text("a"))),
        );
        mgr.apply(source(), &update(id, encode_payload(&text("b"))));
        mgr.apply(
            source(),
            &ObjectMutation {
                object_id: id,
                op: MutationOp::Delete,
            },
        );

        assert_eq!(rx.try_recv().unwrap(), ItemEvent::Created(id));
        assert_eq!(rx.try_recv().unwrap(), ItemEvent::Updated(id));
        assert_eq!(rx.try_recv().unwrap(), ItemEvent::Deleted(id));
    }

    #[test]
    fn test_select_filters_and_sorts() {
        let mut mgr = manager();

        for b in [3u8, 1, 2] {
            let id = ObjectId::from_bytes([b; 32]);
            mgr.apply(
                source(),
                &genesis(id, "register", encode_payload(&text("v"))),
            );
        }

        let live = mgr.select(|item| item.is_live());
        assert_eq!(live.len(), 3);
        assert!(live.windows(2).all(|w| w[0].id < w[1].id));
    }
}
