//! Error types for the auth module.

use thiserror::Error;

/// Errors that can occur while processing credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential's signature does not verify against its issuer.
    #[error("credential signature verification failed")]
    BadSignature,

    /// The credential payload does not decode.
    #[error("credential decode error: {0}")]
    Decode(String),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
