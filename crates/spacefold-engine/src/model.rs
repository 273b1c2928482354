//! Models: pluggable per-type merge semantics.
//!
//! A model knows how to fold an opaque mutation payload into an object's
//! state. Models are registered per type string and shared across every
//! object instance of that type; they hold no per-object state.
//!
//! Both operations must be pure and deterministic — no I/O, no shared
//! mutable state, same output for the same inputs. The engine redelivers
//! batches at-least-once after a crash; the item manager's
//! sequence-checking is the primary duplicate guard and model purity is
//! the second layer behind it.

use std::collections::HashMap;
use std::sync::Arc;

use ciborium::value::Value;
use thiserror::Error;

/// Opaque model-owned state: a CBOR value.
pub type StateValue = Value;

/// Errors a model can produce while interpreting a payload.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The payload does not decode.
    #[error("payload decode error: {0}")]
    Decode(String),

    /// The payload decoded to a shape the model cannot fold.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Per-type merge semantics: create initial state, fold updates into it.
pub trait Model: Send + Sync {
    /// Build initial state from a genesis payload.
    fn genesis(&self, payload: &[u8]) -> Result<StateValue>;

    /// Fold an update payload into the current state.
    fn fold(&self, state: StateValue, payload: &[u8]) -> Result<StateValue>;
}

/// Registry of models keyed by type string.
///
/// Built once per space and shared read-only with the item manager. An
/// unregistered type at genesis time is a per-record rejection, not an
/// error.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn Model>>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in models registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("register", Arc::new(RegisterModel));
        registry.register("record", Arc::new(RecordModel));
        registry
    }

    /// Register a model under a type string. Replaces any previous model
    /// of the same type.
    pub fn register(&mut self, model_type: impl Into<String>, model: Arc<dyn Model>) {
        self.models.insert(model_type.into(), model);
    }

    /// Look up a model by type string.
    pub fn get(&self, model_type: &str) -> Option<Arc<dyn Model>> {
        self.models.get(model_type).cloned()
    }

    /// Registered type strings, for diagnostics.
    pub fn types(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("types", &self.types())
            .finish()
    }
}

fn decode_value(payload: &[u8]) -> Result<Value> {
    ciborium::from_reader(payload).map_err(|e: ciborium::de::Error<std::io::Error>| {
        ModelError::Decode(e.to_string())
    })
}

/// Last-write-wins register: each payload replaces the whole value.
pub struct RegisterModel;

impl Model for RegisterModel {
    fn genesis(&self, payload: &[u8]) -> Result<StateValue> {
        decode_value(payload)
    }

    fn fold(&self, _state: StateValue, payload: &[u8]) -> Result<StateValue> {
        decode_value(payload)
    }
}

/// Record of named fields: payloads are maps, merged shallowly with
/// last-writer-wins per key.
pub struct RecordModel;

impl RecordModel {
    fn expect_map(value: Value) -> Result<Vec<(Value, Value)>> {
        match value {
            Value::Map(entries) => Ok(entries),
            other => Err(ModelError::TypeMismatch(format!(
                "record payload must be a map, got {:?}",
                other
            ))),
        }
    }
}

impl Model for RecordModel {
    fn genesis(&self, payload: &[u8]) -> Result<StateValue> {
        let entries = Self::expect_map(decode_value(payload)?)?;
        Ok(Value::Map(entries))
    }

    fn fold(&self, state: StateValue, payload: &[u8]) -> Result<StateValue> {
        let mut merged = Self::expect_map(state)?;
        let updates = Self::expect_map(decode_value(payload)?)?;

        for (key, value) in updates {
            match merged.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => merged.push((key, value)),
            }
        }

        Ok(Value::Map(merged))
    }
}

/// Encode a CBOR value as a payload (convenience for writers and tests).
pub fn encode_payload(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).expect("CBOR serialization failed");
    buf
}

/// Build a record payload from string keys and values.
pub fn record_payload<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Vec<u8> {
    let entries: Vec<(Value, Value)> = fields
        .into_iter()
        .map(|(k, v)| (Value::Text(k.to_string()), v))
        .collect();
    encode_payload(&Value::Map(entries))
}
