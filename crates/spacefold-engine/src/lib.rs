//! # spacefold-engine
//!
//! The materialization engine: merges per-feed entry streams into one
//! causally ordered, admission-gated mutation stream and folds it into a
//! live object graph.
//!
//! ## Components
//!
//! - [`ItemDemuxer`] - ordering and admission core; one per space
//! - [`ItemManager`] - sole writer of materialized state
//! - [`Model`] / [`ModelRegistry`] - pluggable per-type merge semantics
//! - [`ResultSet`] - reactive read-only views with `wait_for`
//!
//! ## Core Invariants
//!
//! - No mutation is applied twice: the running [`Timeframe`] consumes
//!   each `(feed, seq)` slot exactly once
//! - No non-admitted writer's mutation is ever materialized
//! - Within a feed, strict seq order; across feeds, round-robin
//! - Application to the item manager is strictly serialized
//! - Per-record failures are dropped and logged, never pipeline-fatal
//!
//! [`Timeframe`]: spacefold_core::Timeframe

pub mod demux;
pub mod error;
pub mod item;
pub mod manager;
pub mod model;
pub mod query;

pub use demux::{DemuxConfig, DemuxStats, ItemDemuxer};
pub use error::{EngineError, Result};
pub use item::{Item, ItemEvent};
pub use manager::{Applied, ItemManager, RejectReason};
pub use model::{
    encode_payload, record_payload, Model, ModelError, ModelRegistry, RecordModel, RegisterModel,
    StateValue,
};
pub use query::{ResultSet, Subscription};
