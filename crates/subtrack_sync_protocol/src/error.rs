//! Error types for protocol values.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or decoding protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A payload did not have the expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A textual enum value was not recognised.
    #[error("unknown {kind}: {value:?}")]
    UnknownVariant {
        /// Name of the enum being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

impl ProtocolError {
    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}
