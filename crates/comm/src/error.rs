//! Error types for the correlation layer.

use cean_types::{Method, UnknownMethod};
use thiserror::Error;

/// Errors raised while sending to or reading from the backend channel.
///
/// Backend-reported failures (`success: false`, `errors: [...]`) are payload
/// data and never show up here.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("Transport closed: {message}")]
    TransportClosed { message: String },

    #[error("Failed to encode {method} payload: {source}")]
    Encode {
        method: Method,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode {method} payload: {source}")]
    Decode {
        method: Method,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed envelope: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    UnknownMethod(#[from] UnknownMethod),
}

impl CommError {
    /// Create a transport closed error.
    pub fn transport_closed(message: impl Into<String>) -> Self {
        Self::TransportClosed { message: message.into() }
    }

    /// Create a payload encode error.
    pub fn encode(method: Method, source: serde_json::Error) -> Self {
        Self::Encode { method, source }
    }

    /// Create a payload decode error.
    pub fn decode(method: Method, source: serde_json::Error) -> Self {
        Self::Decode { method, source }
    }
}
