//! Bridge error types.

use bindrpc_protocol::RpcError;
use thiserror::Error;

/// Failures reported by a backend object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// A failure the backend declares itself, with its own code.
    #[error("{message} (code {code})")]
    Application { code: i64, message: String },

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),
}

impl BackendError {
    pub fn application(code: i64, message: impl Into<String>) -> Self {
        BackendError::Application {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        BackendError::InvalidParams(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BackendError::Internal(message.into())
    }
}

/// Errors from building a registry or dispatching through it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    #[error("missing constructor argument '{arg}' for {class}")]
    MissingCtorArg { class: String, arg: String },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("backend panicked in {method}: {message}")]
    Panicked { method: String, message: String },

    #[error("duplicate class: {class}")]
    DuplicateClass { class: String },

    #[error("invalid class definition for {class}: {reason}")]
    InvalidDefinition { class: String, reason: String },
}

impl BridgeError {
    /// Returns a stable label for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            BridgeError::MissingCtorArg { .. } => "INVALID_PARAMS",
            BridgeError::Backend(BackendError::Application { .. }) => "APPLICATION_ERROR",
            BridgeError::Backend(BackendError::InvalidParams(_)) => "INVALID_PARAMS",
            BridgeError::Backend(BackendError::Internal(_)) => "INTERNAL_ERROR",
            BridgeError::Panicked { .. } => "INTERNAL_ERROR",
            BridgeError::DuplicateClass { .. } => "BAD_DEFINITION",
            BridgeError::InvalidDefinition { .. } => "BAD_DEFINITION",
        }
    }
}

impl From<BridgeError> for RpcError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::MethodNotFound { method } => RpcError::method_not_found(&method),
            BridgeError::MissingCtorArg { class, arg } => RpcError::invalid_params(format!(
                "missing constructor argument '{}' for {}",
                arg, class
            )),
            BridgeError::Backend(BackendError::Application { code, message }) => {
                RpcError::application(code, message)
            }
            BridgeError::Backend(BackendError::InvalidParams(message)) => {
                RpcError::invalid_params(message)
            }
            BridgeError::Backend(BackendError::Internal(message)) => RpcError::internal(message),
            other => RpcError::internal(other),
        }
    }
}
