//! Error types for the engine.
//!
//! The taxonomy mirrors how failures are handled: fatal errors abort the
//! pipeline, everything per-record is logged and dropped inside the
//! demuxer rather than surfaced here.

use thiserror::Error;

/// Errors that can occur in the materialization pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage failed. Transient read failures are retried with backoff
    /// by the demuxer; this surfaces only when a caller hits storage
    /// directly.
    #[error("feed error: {0}")]
    Feed(#[from] spacefold_feed::FeedError),

    /// Credential processing failed structurally.
    #[error("auth error: {0}")]
    Auth(#[from] spacefold_auth::AuthError),

    /// Entry failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] spacefold_core::ValidationError),

    /// A model rejected a payload.
    #[error("model error: {0}")]
    Model(#[from] crate::model::ModelError),

    /// The event stream closed while a caller was waiting on it.
    #[error("event stream closed")]
    EventStreamClosed,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
