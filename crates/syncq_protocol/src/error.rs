//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or (de)serializing operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to encode an operation to CBOR.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Failed to decode CBOR bytes into an operation.
    #[error("decoding failed: {0}")]
    Decode(String),

    /// The operation violates a structural rule.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl ProtocolError {
    /// Create an invalid operation error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
}
