//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] bindrpc_protocol::ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns whether the connection was dropped because frame boundaries
    /// were lost (oversized length, truncation, mid-frame timeout).
    pub fn is_framing(&self) -> bool {
        matches!(self, ServerError::Protocol(e) if e.is_framing())
    }
}
