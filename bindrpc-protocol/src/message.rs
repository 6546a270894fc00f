//! JSON-RPC 2.0 request and response envelopes.

use crate::error::RpcError;
use crate::JSONRPC_VERSION;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Request parameters: a mapping or an ordered sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Named(Map<String, Value>),
    Positional(Vec<Value>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Named(Map::new())
    }
}

impl Params {
    /// Converts a raw `params` value. `null` means no parameters.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        match value {
            Value::Object(map) => Ok(Params::Named(map)),
            Value::Array(items) => Ok(Params::Positional(items)),
            Value::Null => Ok(Params::default()),
            other => Err(RpcError::invalid_params(format!(
                "expected object or array, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        match self {
            Params::Named(map) => map.len(),
            Params::Positional(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a named parameter, or a positional one by index.
    pub fn get(&self, name: &str, position: usize) -> Option<&Value> {
        match self {
            Params::Named(map) => map.get(name),
            Params::Positional(items) => items.get(position),
        }
    }

    /// Converts back into a JSON value.
    pub fn into_value(self) -> Value {
        match self {
            Params::Named(map) => Value::Object(map),
            Params::Positional(items) => Value::Array(items),
        }
    }
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version, "2.0".
    pub jsonrpc: String,

    /// Correlation ID. `None` marks a notification; `Some(Value::Null)` is a
    /// request whose response carries `"id": null`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,

    /// Dotted `Class.member` name.
    pub method: String,

    /// Method parameters.
    #[serde(default, deserialize_with = "deserialize_params")]
    pub params: Params,
}

impl Request {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Params) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Creates a notification (no `id`, no response expected).
    pub fn notification(method: impl Into<String>, params: Params) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Response envelope.
///
/// Built only through [`Response::success`], [`Response::failure`] or
/// [`Response::build`], so exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version, "2.0".
    pub jsonrpc: String,

    /// The request ID, or `null` when it could not be recovered.
    pub id: Value,

    /// Result payload (for successful responses).
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,

    /// Error details (for error responses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Builds the response for a dispatched request.
    ///
    /// Returns `None` for notifications, whatever the outcome.
    pub fn build(id: Option<Value>, outcome: Result<Value, RpcError>) -> Option<Self> {
        let id = id?;
        Some(match outcome {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::failure(id, error),
        })
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns whether exactly one of `result` and `error` is present.
    pub fn is_well_formed(&self) -> bool {
        self.result.is_some() != self.error.is_some()
    }

    /// Splits the response into its outcome.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only a missing field
/// becomes `None` (through `#[serde(default)]`).
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn deserialize_params<'de, D>(deserializer: D) -> Result<Params, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Params::from_value(value).map_err(|e| serde::de::Error::custom(e.message))
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = Request::new("abc", "Host.ping", Params::default());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "id": "abc", "method": "Host.ping", "params": {}})
        );
    }

    #[test]
    fn test_notification_omits_id() {
        let req = Request::notification("Host.ping", Params::Positional(vec![]));
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(req.is_notification());
    }

    #[test]
    fn test_null_id_is_not_a_notification() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"Host.ping"}"#).unwrap();
        assert_eq!(req.id, Some(Value::Null));
        assert!(!req.is_notification());
        assert_eq!(req.params, Params::default());

        let req: Request = serde_json::from_str(r#"{"jsonrpc":"2.0","method":"Host.ping"}"#).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn test_params_from_value() {
        assert_eq!(Params::from_value(Value::Null).unwrap(), Params::default());
        assert!(matches!(
            Params::from_value(json!([1, 2])).unwrap(),
            Params::Positional(ref items) if items.len() == 2
        ));
        let err = Params::from_value(json!(5)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[test]
    fn test_params_get() {
        let named = Params::from_value(json!({"vmID": "v1"})).unwrap();
        assert_eq!(named.get("vmID", 0), Some(&json!("v1")));
        assert_eq!(named.get("other", 0), None);

        let positional = Params::from_value(json!(["v1", "v2"])).unwrap();
        assert_eq!(positional.get("ignored", 1), Some(&json!("v2")));
    }

    #[test]
    fn test_success_response_shape() {
        let resp = Response::success(json!(7), json!({"pong": true}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "id": 7, "result": {"pong": true}}));
        assert!(resp.is_well_formed());
    }

    #[test]
    fn test_null_result_is_still_a_result() {
        let resp = Response::success(json!(1), Value::Null);
        let text = serde_json::to_string(&resp).unwrap();
        assert!(text.contains(r#""result":null"#));

        let parsed: Response = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.result, Some(Value::Null));
        assert!(parsed.is_well_formed());
    }

    #[test]
    fn test_error_response_shape() {
        let resp = Response::failure(Value::Null, RpcError::parse_error("bad"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["id"], Value::Null);
        assert_eq!(json["error"]["code"], -32700);
        assert!(json.get("result").is_none());
        assert!(resp.is_well_formed());
    }

    #[test]
    fn test_build_skips_notifications() {
        assert!(Response::build(None, Ok(json!(true))).is_none());
        assert!(Response::build(None, Err(RpcError::internal("boom"))).is_none());

        let resp = Response::build(Some(json!("x")), Err(RpcError::internal("boom"))).unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.id, json!("x"));
    }

    #[test]
    fn test_into_result() {
        let ok = Response::success(json!(1), json!(true));
        assert_eq!(ok.into_result().unwrap(), json!(true));

        let err = Response::failure(json!(1), RpcError::application(1, "nope"));
        assert_eq!(err.into_result().unwrap_err().code, ErrorCode::Application(1));
    }
}
