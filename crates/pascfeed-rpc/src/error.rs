//! Transport-level error types.

use pascfeed_core::FeedError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to the node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, bad status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Returns `true` if the node answered with a structured error object.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

impl From<TransportError> for FeedError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout { ms } => FeedError::Timeout { ms },
            other => FeedError::Rpc(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_feed_error() {
        let e: FeedError = TransportError::Http("connection refused".into()).into();
        assert!(matches!(e, FeedError::Rpc(msg) if msg.contains("connection refused")));

        let e: FeedError = TransportError::Timeout { ms: 500 }.into();
        assert!(matches!(e, FeedError::Timeout { ms: 500 }));
    }

    #[test]
    fn protocol_error_classification() {
        let rpc = TransportError::Rpc(JsonRpcError {
            code: 1003,
            message: "Not found".into(),
            data: None,
        });
        assert!(rpc.is_protocol_error());
        assert!(!TransportError::Http("x".into()).is_protocol_error());
    }
}
