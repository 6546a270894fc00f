//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use bindrpc_protocol::{Params, Response};
use serde_json::{json, Value};
use std::sync::Arc;

/// High-level client for bindrpc.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    // =========================================================================
    // Generic calls
    // =========================================================================

    /// Calls `method` and returns its result. An error response becomes
    /// [`ClientError::Rpc`].
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let params = Params::from_value(params)?;
        let response = self.conn.request(method, params).await?;
        Ok(response.into_result()?)
    }

    /// Sends a notification.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), ClientError> {
        let params = Params::from_value(params)?;
        self.conn.notify(method, params).await
    }

    /// Sends an arbitrary payload in one frame and returns the response
    /// as received.
    pub async fn call_raw(&self, payload: &[u8]) -> Result<Response, ClientError> {
        self.conn.request_raw(payload).await
    }

    // =========================================================================
    // Host operations
    // =========================================================================

    /// Pings the server.
    pub async fn ping(&self) -> Result<bool, ClientError> {
        let result = self.call("Host.ping", json!({})).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Gets the server version.
    pub async fn version(&self) -> Result<Value, ClientError> {
        self.call("Host.getVersion", json!({})).await
    }

    /// Lists every exposed `Class.member`.
    pub async fn methods(&self) -> Result<Vec<String>, ClientError> {
        let result = self.call("Host.getMethods", json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }
}
