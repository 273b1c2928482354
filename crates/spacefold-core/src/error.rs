//! Error types for spacefold-core.

use thiserror::Error;

/// Core errors that can occur while working with feed entries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("payload hash mismatch: expected {expected}, got {actual}")]
    PayloadHashMismatch { expected: String, actual: String },

    #[error("unsupported entry version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for entry structure and signatures.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("payload hash does not match header")]
    PayloadHashMismatch,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("mutation payload does not decode: {0}")]
    MalformedBatch(String),

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::PayloadHashMismatch { .. } => ValidationError::PayloadHashMismatch,
            CoreError::UnsupportedVersion(v) => ValidationError::UnsupportedVersion(v),
            CoreError::MalformedEntry(msg) => ValidationError::StructuralError(msg),
            CoreError::EncodingError(msg) | CoreError::DecodingError(msg) => {
                ValidationError::StructuralError(msg)
            }
        }
    }
}
