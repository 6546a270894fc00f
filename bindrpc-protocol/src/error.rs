//! Protocol error types and error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors that occur while finding frame boundaries or moving bytes.
///
/// Every variant except [`ProtocolError::Json`] is a framing failure: the
/// byte position of the next frame is unknown and the connection must be
/// closed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: usize },

    #[error("truncated frame: connection closed after {buffered} of {expected} bytes")]
    Truncated { buffered: usize, expected: usize },

    #[error("timed out waiting for frame data")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether this error loses frame synchronization.
    pub fn is_framing(&self) -> bool {
        !matches!(self, ProtocolError::Json(_))
    }
}

/// JSON-RPC error codes.
///
/// The reserved codes are fixed by JSON-RPC 2.0. Backends may report their
/// own codes, which pass through unchanged as [`ErrorCode::Application`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Application(i64),
}

impl ErrorCode {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Returns the numeric code sent on the wire.
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => Self::PARSE_ERROR,
            ErrorCode::InvalidRequest => Self::INVALID_REQUEST,
            ErrorCode::MethodNotFound => Self::METHOD_NOT_FOUND,
            ErrorCode::InvalidParams => Self::INVALID_PARAMS,
            ErrorCode::InternalError => Self::INTERNAL_ERROR,
            ErrorCode::Application(code) => *code,
        }
    }

    /// Maps a wire code back to its kind.
    pub fn from_code(code: i64) -> Self {
        match code {
            Self::PARSE_ERROR => ErrorCode::ParseError,
            Self::INVALID_REQUEST => ErrorCode::InvalidRequest,
            Self::METHOD_NOT_FOUND => ErrorCode::MethodNotFound,
            Self::INVALID_PARAMS => ErrorCode::InvalidParams,
            Self::INTERNAL_ERROR => ErrorCode::InternalError,
            other => ErrorCode::Application(other),
        }
    }

    /// Returns a stable label, used for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::Application(_) => "APPLICATION_ERROR",
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        ErrorCode::from_code(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Application(code) => write!(f, "APPLICATION_ERROR({})", code),
            other => f.write_str(other.name()),
        }
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message} ({code})")]
pub struct RpcError {
    /// Error code.
    pub code: ErrorCode,

    /// Human-readable error message.
    pub message: String,

    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::ParseError, format!("Parse error: {}", detail))
    }

    pub fn invalid_request(detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidRequest,
            format!("Invalid request: {}", detail),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InvalidParams, format!("Invalid params: {}", detail))
    }

    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, format!("Internal error: {}", detail))
    }

    /// A backend-declared failure; the code is passed through as given.
    pub fn application(code: i64, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::from_code(code), message)
    }
}
