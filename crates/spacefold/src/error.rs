//! Error types for the Space API.

use thiserror::Error;

use spacefold_auth::AuthError;
use spacefold_core::ValidationError;
use spacefold_engine::EngineError;
use spacefold_feed::FeedError;

/// Errors that can occur during Space operations.
#[derive(Debug, Error)]
pub enum SpaceError {
    /// Entry validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Feed storage failed.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Credential processing failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Engine failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The space's pipeline has stopped.
    #[error("space is closed")]
    Closed,

    /// The consumer task could not be joined.
    #[error("consumer task failed: {0}")]
    Join(String),
}

/// Result type for Space operations.
pub type Result<T> = std::result::Result<T, SpaceError>;
