//! Client error types.

use bindrpc_protocol::{ProtocolError, RpcError};
use serde_json::Value;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("server error: {0}")]
    Rpc(RpcError),

    #[error("response id {actual} does not match request id {expected}")]
    UnexpectedId { expected: Value, actual: Value },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Timeout => ClientError::Timeout,
            ProtocolError::ConnectionClosed => ClientError::ConnectionClosed,
            ProtocolError::Io(e) => ClientError::Io(e),
            ProtocolError::Json(e) => ClientError::Json(e),
            other => ClientError::Protocol(other),
        }
    }
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        ClientError::Rpc(err)
    }
}

impl ClientError {
    /// Returns whether this error is retryable on a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout | ClientError::ConnectionClosed
        )
    }

    /// Returns the JSON-RPC error when the server answered with one.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            ClientError::Rpc(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors_are_unwrapped() {
        assert!(matches!(
            ClientError::from(ProtocolError::Timeout),
            ClientError::Timeout
        ));
        assert!(matches!(
            ClientError::from(ProtocolError::ConnectionClosed),
            ClientError::ConnectionClosed
        ));
        assert!(matches!(
            ClientError::from(ProtocolError::FrameTooLarge { size: 10, max: 5 }),
            ClientError::Protocol(_)
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(!ClientError::Rpc(RpcError::internal("boom")).is_retryable());
        assert!(!ClientError::NotConnected.is_retryable());
    }
}
