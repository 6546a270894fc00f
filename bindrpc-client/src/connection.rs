//! Connection management.

use crate::error::ClientError;
use bindrpc_protocol::{read_frame, write_frame, Params, Request, Response, DEFAULT_MAX_PAYLOAD_SIZE};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// How long to wait for a response frame.
    pub request_timeout: Duration,
    /// Largest response payload accepted (0 = unlimited).
    pub max_frame_bytes: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_frame_bytes: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }
}

/// A connection to a bindrpc server.
///
/// The server answers frames strictly in order, so one request is in flight
/// at a time: the stream lock is held from write until the response is read.
pub struct Connection {
    config: ConnectionConfig,
    stream: Mutex<Option<TcpStream>>,
    /// Next request ID.
    next_id: AtomicU64,
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let tcp_stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        tcp_stream.set_nodelay(true).ok();

        *self.stream.lock().await = Some(tcp_stream);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("Connected to {}", self.config.addr);
        Ok(())
    }

    /// Sends a request and waits for its response.
    ///
    /// Error responses are returned as responses; see
    /// [`Response::into_result`].
    pub async fn request(&self, method: &str, params: Params) -> Result<Response, ClientError> {
        let id = Value::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        tracing::debug!("Sending request id={} method={}", id, method);
        let request = Request::new(id.clone(), method, params);
        let payload = serde_json::to_vec(&request)?;

        let response = self.exchange(&payload).await?;
        if response.id != id {
            return Err(ClientError::UnexpectedId {
                expected: id,
                actual: response.id,
            });
        }
        Ok(response)
    }

    /// Sends a notification. Nothing is read back.
    pub async fn notify(&self, method: &str, params: Params) -> Result<(), ClientError> {
        tracing::debug!("Sending notification method={}", method);
        let payload = serde_json::to_vec(&Request::notification(method, params))?;

        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ClientError::NotConnected)?;
        let result = write_frame(stream, &payload).await.map_err(ClientError::from);
        self.check(result)
    }

    /// Frames `payload` as is and waits for the response.
    pub async fn request_raw(&self, payload: &[u8]) -> Result<Response, ClientError> {
        self.exchange(payload).await
    }

    /// Writes `bytes` without framing them.
    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ClientError::NotConnected)?;
        let result = async {
            stream.write_all(bytes).await?;
            stream.flush().await?;
            Ok::<(), ClientError>(())
        }
        .await;
        self.check(result)
    }

    /// Reads the next response frame.
    pub async fn read_response(&self) -> Result<Response, ClientError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ClientError::NotConnected)?;
        let result = self.read_from(stream).await;
        self.check(result)
    }

    async fn exchange(&self, payload: &[u8]) -> Result<Response, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ClientError::NotConnected)?;
        let result = async {
            write_frame(stream, payload).await?;
            tracing::debug!("Frame sent ({} bytes), waiting for response...", payload.len());
            self.read_from(stream).await
        }
        .await;
        self.check(result)
    }

    async fn read_from(&self, stream: &mut TcpStream) -> Result<Response, ClientError> {
        let payload = read_frame(
            stream,
            self.config.request_timeout,
            self.config.max_frame_bytes,
        )
        .await?;
        let response: Response = serde_json::from_slice(&payload)?;
        tracing::debug!(
            "Response id={} ({})",
            response.id,
            if response.is_ok() { "ok" } else { "error" }
        );
        Ok(response)
    }

    /// Marks the connection unusable when frame boundaries may be lost.
    fn check<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ref e) = result {
            if !matches!(e, ClientError::Rpc(_) | ClientError::UnexpectedId { .. }) {
                tracing::debug!("Connection to {} unusable: {}", self.config.addr, e);
                self.connected.store(false, Ordering::SeqCst);
            }
        }
        result
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindrpc_protocol::Frame;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("127.0.0.1:4044".parse().unwrap());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_PAYLOAD_SIZE);
    }

    #[tokio::test]
    async fn test_not_connected() {
        let conn = Connection::new(ConnectionConfig::new("127.0.0.1:4044".parse().unwrap()));
        let result = conn.request("Host.ping", Params::default()).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    /// Accepts one connection and answers the first frame with `reply`.
    async fn one_shot_server(reply: Value) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 8];
            stream.read_exact(&mut header).await.unwrap();
            let mut body = vec![0u8; u64::from_be_bytes(header) as usize];
            stream.read_exact(&mut body).await.unwrap();
            let frame = Frame::from_json(&reply).unwrap();
            stream.write_all(&frame.encode()).await.unwrap();
            // Hold the socket open until the client is done
            let _ = stream.read(&mut header).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_unexpected_id() {
        let addr = one_shot_server(json!({"jsonrpc": "2.0", "id": 99, "result": true})).await;
        let conn = Connection::new(ConnectionConfig::new(addr));
        conn.connect().await.unwrap();

        let result = conn.request("Host.ping", Params::default()).await;
        assert!(matches!(result, Err(ClientError::UnexpectedId { .. })));
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_response_timeout_disconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let conn = Connection::new(
            ConnectionConfig::new(addr).with_request_timeout(Duration::from_millis(100)),
        );
        conn.connect().await.unwrap();
        let result = conn.request("Host.ping", Params::default()).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        assert!(!conn.is_connected());
    }
}
