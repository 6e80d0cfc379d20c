//! Error types for envelope handling.

use thiserror::Error;

/// Errors that can occur when reading or decoding messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The message type tag is not part of the protocol.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The envelope carries a different type than the payload expects.
    #[error("unexpected message type: expected {expected}, got {actual}")]
    UnexpectedType {
        expected: &'static str,
        actual: String,
    },

    /// The envelope itself is malformed.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The details do not match the payload of the message type.
    #[error("invalid {msg_type} details: {reason}")]
    InvalidDetails {
        msg_type: &'static str,
        reason: String,
    },

    /// A required builder field was not set.
    #[error("missing envelope field: {0}")]
    MissingField(&'static str),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MessageError {
    fn from(err: serde_json::Error) -> Self {
        MessageError::Serialization(err.to_string())
    }
}
