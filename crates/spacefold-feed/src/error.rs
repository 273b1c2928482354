//! Error types for the feed module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempted to append to a feed without its signing key.
    #[error("feed {0} is not writable from this process")]
    NotWritable(String),

    /// Another process holds the feed-directory lock. Startup-fatal.
    #[error("feed directory is locked: {0}")]
    Locked(PathBuf),

    /// A stored entry failed to decode.
    #[error("corrupt entry in feed {feed} at seq {seq}")]
    CorruptEntry { feed: String, seq: u64 },

    /// A different entry already occupies this feed position.
    #[error("sequence conflict in feed {feed} at seq {seq}: existing entry {existing}")]
    SequenceConflict {
        feed: String,
        seq: u64,
        existing: String,
    },

    /// Entry addressed to a different space.
    #[error("entry belongs to space {got}, store holds space {expected}")]
    WrongSpace { expected: String, got: String },

    /// Entry failed validation at the ingest boundary.
    #[error("validation error: {0}")]
    Validation(#[from] spacefold_core::ValidationError),

    /// Encoding/decoding failure outside of storage.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A blocking storage task failed to complete.
    #[error("background task failed: {0}")]
    Background(String),
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
