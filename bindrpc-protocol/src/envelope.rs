//! JSON-RPC 2.0 envelope validation.
//!
//! Turns a raw frame payload into a [`Request`] or a classified rejection.
//! Method names are not interpreted here: a well-formed envelope naming a
//! method that cannot exist is left for dispatch to report as
//! Method-Not-Found.

use crate::error::RpcError;
use crate::message::{json_type_name, Params, Request};
use crate::JSONRPC_VERSION;
use serde_json::Value;

/// A payload that could not be turned into a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// ID to answer with. `None` when the payload was recognisably a
    /// notification, in which case nothing is sent back.
    pub id: Option<Value>,
    pub error: RpcError,
}

impl Rejected {
    fn new(id: Option<Value>, error: RpcError) -> Self {
        Self { id, error }
    }
}

/// Validates a frame payload.
pub fn validate(payload: &[u8]) -> Result<Request, Rejected> {
    // from_slice rejects invalid UTF-8 and trailing bytes after the value
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| Rejected::new(Some(Value::Null), RpcError::parse_error(e)))?;

    let Value::Object(mut obj) = value else {
        return Err(Rejected::new(
            Some(Value::Null),
            RpcError::invalid_request(format!(
                "expected a JSON object, got {}",
                json_type_name(&value)
            )),
        ));
    };

    // From here on an absent id marks a notification, which is never answered
    let id = obj.remove("id");

    if let Some(version) = obj.get("jsonrpc") {
        if version.as_str() != Some(JSONRPC_VERSION) {
            return Err(Rejected::new(
                id.clone(),
                RpcError::invalid_request(format!("unsupported jsonrpc version {}", version)),
            ));
        }
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        Some(Value::String(_)) => {
            return Err(Rejected::new(
                id.clone(),
                RpcError::invalid_request("method must not be empty"),
            ))
        }
        Some(other) => {
            return Err(Rejected::new(
                id.clone(),
                RpcError::invalid_request(format!(
                    "method must be a string, got {}",
                    json_type_name(&other)
                )),
            ))
        }
        None => {
            return Err(Rejected::new(
                id.clone(),
                RpcError::invalid_request("missing method"),
            ))
        }
    };

    let params = match Params::from_value(obj.remove("params").unwrap_or(Value::Null)) {
        Ok(params) => params,
        Err(error) => return Err(Rejected::new(id, error)),
    };

    Ok(Request {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        method,
        params,
    })
}
