//! TCP server implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::RequestHandler;
use crate::metrics::Metrics;
use crate::session::{Session, SessionState};
use bindrpc_bridge::Bridge;
use bindrpc_protocol::{Decoder, Encoder, ProtocolError, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_PORT};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// How long a connection may sit between frames.
    pub idle_timeout: Duration,
    /// How long a whole frame may take to arrive once it has started.
    pub read_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest declared payload accepted (0 = unlimited).
    pub max_frame_bytes: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("idle_timeout", &self.idle_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_connections", &self.max_connections)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(300),
            read_timeout: Duration::from_secs(30),
            max_connections: 1000,
            max_frame_bytes: DEFAULT_MAX_PAYLOAD_SIZE,
            metrics: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the listener settings from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            idle_timeout: config.network.idle_timeout(),
            read_timeout: config.network.read_timeout(),
            max_connections: config.network.max_connections,
            max_frame_bytes: config.network.max_frame_bytes,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether metrics are enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    /// Complete frames received.
    pub frames_total: AtomicU64,
    /// Responses written.
    pub responses_total: AtomicU64,
    /// Connections that ended with an error.
    pub errors_total: AtomicU64,
    /// Connections closed because frame boundaries were lost.
    pub framing_errors_total: AtomicU64,
}

/// TCP server for bindrpc.
pub struct Server {
    config: ServerConfig,
    handler: Arc<RequestHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server dispatching through `bridge`.
    pub fn new(config: ServerConfig, bridge: Arc<Bridge>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handler = RequestHandler::new(bridge);
        if let Some(ref metrics) = config.metrics {
            handler = handler.with_metrics(metrics.clone());
        }
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address. Port 0 picks a free port.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Binds and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        tracing::info!("Server listening on {}", local_addr);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => self.accept(tcp_stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(&self, tcp_stream: TcpStream, addr: SocketAddr) {
        if self.stats.connections_active.load(Ordering::Relaxed)
            >= self.config.max_connections as u64
        {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            return;
        }

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.connections_total.inc();
            metrics.connections_active.inc();
        }

        let handler = self.handler.clone();
        let stats = self.stats.clone();
        let config = self.config.clone();
        let mut conn_shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let result = Self::handle_connection(
                tcp_stream,
                addr,
                &handler,
                &config,
                &stats,
                &mut conn_shutdown,
            )
            .await;

            match result {
                Ok(()) | Err(ServerError::ShuttingDown) => {}
                Err(e) if e.is_framing() => {
                    tracing::warn!("[{}] Framing error, closing connection: {}", addr, e);
                    stats.framing_errors_total.fetch_add(1, Ordering::Relaxed);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                    if let Some(ref metrics) = config.metrics {
                        metrics.framing_errors_total.inc();
                    }
                }
                Err(e) => {
                    tracing::debug!("Connection {} error: {}", addr, e);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }

            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            if let Some(ref metrics) = config.metrics {
                metrics.connections_active.dec();
            }

            tracing::info!("Client disconnected: {}", addr);
        });
    }

    /// Handles a single connection until it closes.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: &RequestHandler,
        config: &ServerConfig,
        stats: &ServerStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        stream.set_nodelay(true).ok();
        tracing::info!("Client connected: {}", addr);

        let mut session = Session::new(addr);
        let result = Self::connection_loop(
            &mut stream,
            &mut session,
            handler,
            config,
            stats,
            shutdown,
        )
        .await;
        session.close();

        tracing::debug!(
            "[{}] Session {} closed after {} frames, {} responses ({:?})",
            addr,
            session.id,
            session.frame_count(),
            session.response_count(),
            session.age()
        );
        result
    }

    async fn connection_loop(
        stream: &mut TcpStream,
        session: &mut Session,
        handler: &RequestHandler,
        config: &ServerConfig,
        stats: &ServerStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = session.remote_addr;
        let mut decoder = Decoder::with_max_payload(config.max_frame_bytes);
        let mut buf = [0u8; 8192];

        loop {
            // Between frames the idle timeout applies; once a frame has
            // started, all of it must arrive within the read timeout.
            let mid_frame = decoder.is_mid_frame();
            let deadline = if mid_frame {
                session.begin_frame() + config.read_timeout
            } else {
                std::time::Instant::now() + config.idle_timeout
            };
            let deadline = tokio::time::Instant::from_std(deadline);

            tokio::select! {
                result = tokio::time::timeout_at(deadline, stream.read(&mut buf)) => {
                    match result {
                        Err(_) if mid_frame => {
                            return Err(ProtocolError::Timeout.into());
                        }
                        Err(_) => {
                            tracing::debug!("[{}] Idle timeout", addr);
                            return Ok(());
                        }
                        Ok(Ok(0)) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            decoder.finish()?;
                            return Ok(());
                        }
                        Ok(Ok(n)) => {
                            tracing::debug!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Ok(Err(e)) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            return Err(ServerError::Io(e));
                        }
                    }
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    return Err(ServerError::ShuttingDown);
                }
            }

            // Process any complete frames, one response each, in order
            while let Some(frame) = decoder.decode_frame()? {
                session.transition(SessionState::Dispatch);
                session.record_frame();
                stats.frames_total.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("[{}] Frame: {} bytes", addr, frame.payload.len());

                if let Some(response) = handler.handle_frame(&frame.payload).await {
                    session.transition(SessionState::Respond);
                    tracing::debug!(
                        "[{}] Response: {} (id={})",
                        addr,
                        if response.is_ok() { "OK" } else { "ERROR" },
                        response.id
                    );

                    let response_bytes = Encoder::encode_response(&response)?;
                    stream.write_all(&response_bytes).await?;
                    stream.flush().await?;
                    session.record_response();
                    stats.responses_total.fetch_add(1, Ordering::Relaxed);
                }
                session.transition(SessionState::AwaitLength);
            }

            if decoder.awaiting_body() {
                session.transition(SessionState::AwaitBody);
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns a receiver that fires when the server shuts down.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindrpc_bridge::testing::FakeApi;
    use bindrpc_bridge::{BackendError, RegistryBuilder};
    use bindrpc_protocol::{ErrorCode, Frame};
    use serde_json::{json, Value};

    const ID: &str = "2c8134fd-7dd4-4cfc-b7f8-6b7549399cb6";

    async fn start_server(fake: &FakeApi, tweak: impl FnOnce(&mut ServerConfig)) -> (Arc<Server>, SocketAddr) {
        let bridge = RegistryBuilder::new()
            .class(fake.class("Host").methods(["ping", "getStats"]))
            .build()
            .unwrap();

        let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        config.read_timeout = Duration::from_millis(300);
        tweak(&mut config);

        let server = Arc::new(Server::new(config, Arc::new(bridge)));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });
        (server, addr)
    }

    fn build_message(value: &Value) -> Vec<u8> {
        Frame::from_json(value).unwrap().encode().to_vec()
    }

    async fn read_reply(stream: &mut TcpStream) -> Result<Value, String> {
        let mut header = [0u8; 8];
        tokio::time::timeout(Duration::from_secs(3), stream.read_exact(&mut header))
            .await
            .map_err(|_| "timed out reading length".to_string())?
            .map_err(|e| format!("no length received: {}", e))?;
        let len = u64::from_be_bytes(header) as usize;
        let mut body = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(3), stream.read_exact(&mut body))
            .await
            .map_err(|_| "timed out reading body".to_string())?
            .map_err(|e| format!("short body: {}", e))?;
        serde_json::from_slice(&body).map_err(|e| e.to_string())
    }

    /// Opens a connection, sends `bytes` and reads one reply.
    async fn send_message(addr: SocketAddr, bytes: &[u8]) -> Result<Value, String> {
        let mut stream = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
        stream.write_all(bytes).await.map_err(|e| e.to_string())?;
        read_reply(&mut stream).await
    }

    fn ping_message() -> Vec<u8> {
        build_message(&json!({"jsonrpc": "2.0", "id": ID, "method": "Host.ping", "params": {}}))
    }

    async fn assert_closed(stream: &mut TcpStream) {
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(3), stream.read(&mut buf))
            .await
            .expect("server did not close the connection")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_ping() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;
        fake.expect("Host", "ping", json!(true));

        let reply = send_message(addr, &ping_message()).await.unwrap();
        assert!(reply.get("error").is_none());
        assert_eq!(reply["result"], json!(true));
        assert_eq!(reply["id"], json!(ID));
        assert_eq!(reply["jsonrpc"], "2.0");
    }

    #[tokio::test]
    async fn test_ping_error() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;
        fake.expect_error("Host", "ping", BackendError::application(1, "ping failed"));

        let reply = send_message(addr, &ping_message()).await.unwrap();
        assert_eq!(reply["error"]["code"], 1);
        assert!(reply.get("result").is_none());
    }

    #[tokio::test]
    async fn test_no_method() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;

        let msg = build_message(&json!({"jsonrpc": "2.0", "id": ID, "method": "Host.fake"}));
        let reply = send_message(addr, &msg).await.unwrap();
        assert_eq!(reply["error"]["code"], ErrorCode::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_method() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;

        let msg = build_message(
            &json!({"jsonrpc": "2.0", "id": ID, "method": "malformed'", "params": []}),
        );
        let reply = send_message(addr, &msg).await.unwrap();
        assert_eq!(reply["error"]["code"], ErrorCode::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_size() {
        let fake = FakeApi::new();
        let (server, addr) = start_server(&fake, |_| {}).await;

        assert!(send_message(addr, b"malformed message").await.is_err());

        // The server itself keeps serving
        fake.expect("Host", "ping", json!(true));
        assert!(send_message(addr, &ping_message()).await.is_ok());
        assert!(server.stats().framing_errors_total.load(Ordering::Relaxed) >= 1);
    }

    #[tokio::test]
    async fn test_client_not_json() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;

        let msg = Frame::new(&b"malformed message"[..]).encode();
        let reply = send_message(addr, &msg).await.unwrap();
        assert_eq!(reply["error"]["code"], ErrorCode::PARSE_ERROR);
        assert_eq!(reply["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_synchronization() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;

        let msg = build_message(&json!({"jsonrpc": "2.0", "id": ID, "method": "Host.ping"}));
        let do_ping = |bytes: Vec<u8>| {
            let fake = fake.clone();
            async move {
                fake.clear();
                fake.expect("Host", "ping", json!(true));
                let reply = send_message(addr, &bytes).await?;
                match reply.get("error") {
                    Some(error) => Err(error.to_string()),
                    None => Ok(reply),
                }
            }
        };

        // Truncated message
        assert!(do_ping(msg[..msg.len() - 1].to_vec()).await.is_err());

        // The server recovers
        assert!(do_ping(msg.clone()).await.is_ok());

        // Too much data
        let mut extra = msg.clone();
        extra.extend_from_slice(b"Hello");
        assert!(do_ping(extra).await.is_ok());

        // The server recovers
        assert!(do_ping(msg.clone()).await.is_ok());
    }

    #[tokio::test]
    async fn test_internal_error() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;

        let msg = build_message(&json!({"jsonrpc": "2.0", "id": ID, "method": "Host.ping"}));
        let reply = send_message(addr, &msg).await.unwrap();
        assert_eq!(reply["error"]["code"], ErrorCode::INTERNAL_ERROR);
        assert!(reply["error"]["message"]
            .as_str()
            .unwrap()
            .contains("No API data available for Host.ping"));
    }

    #[tokio::test]
    async fn test_many_requests_on_one_connection() {
        let fake = FakeApi::new();
        let (server, addr) = start_server(&fake, |_| {}).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        for i in 0..3 {
            fake.expect("Host", "ping", json!(i));
            let msg = build_message(&json!({"jsonrpc": "2.0", "id": i, "method": "Host.ping"}));
            stream.write_all(&msg).await.unwrap();
            let reply = read_reply(&mut stream).await.unwrap();
            assert_eq!(reply["id"], json!(i));
            assert_eq!(reply["result"], json!(i));
        }

        assert_eq!(server.stats().connections_total.load(Ordering::Relaxed), 1);
        assert_eq!(server.stats().responses_total.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_back_to_back_frames_in_one_write() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;
        fake.expect("Host", "ping", json!("first"));
        fake.expect("Host", "ping", json!("second"));

        let mut bytes = build_message(&json!({"id": 1, "method": "Host.ping"}));
        bytes.extend(build_message(&json!({"id": 2, "method": "Host.ping"})));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&bytes).await.unwrap();
        assert_eq!(read_reply(&mut stream).await.unwrap()["result"], "first");
        assert_eq!(read_reply(&mut stream).await.unwrap()["result"], "second");
    }

    #[tokio::test]
    async fn test_notification_is_silent() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;
        fake.expect("Host", "ping", json!("notified"));
        fake.expect("Host", "ping", json!("answered"));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&build_message(&json!({"jsonrpc": "2.0", "method": "Host.ping"})))
            .await
            .unwrap();
        stream
            .write_all(&build_message(&json!({"jsonrpc": "2.0", "method": "Host.fake"})))
            .await
            .unwrap();
        stream
            .write_all(&build_message(&json!({"jsonrpc": "2.0", "id": 7, "method": "Host.ping"})))
            .await
            .unwrap();

        // The first frame read back answers the request, not the notifications
        let reply = read_reply(&mut stream).await.unwrap();
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["result"], "answered");
        assert_eq!(fake.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_null_id_gets_response() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;
        fake.expect("Host", "ping", json!(true));

        let msg = build_message(&json!({"jsonrpc": "2.0", "id": null, "method": "Host.ping"}));
        let reply = send_message(addr, &msg).await.unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["result"], true);
    }

    #[tokio::test]
    async fn test_parse_error_keeps_connection() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;
        fake.expect("Host", "ping", json!(true));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&Frame::new(&b"{not json"[..]).encode())
            .await
            .unwrap();
        let reply = read_reply(&mut stream).await.unwrap();
        assert_eq!(reply["error"]["code"], ErrorCode::PARSE_ERROR);

        stream.write_all(&ping_message()).await.unwrap();
        let reply = read_reply(&mut stream).await.unwrap();
        assert_eq!(reply["result"], true);
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let fake = FakeApi::new();
        let (server, addr) = start_server(&fake, |c| c.max_frame_bytes = 64).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&1024u64.to_be_bytes()).await.unwrap();
        assert_closed(&mut stream).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.stats().framing_errors_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_truncated_frame_times_out() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |_| {}).await;

        let msg = ping_message();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&msg[..msg.len() - 1]).await.unwrap();
        assert_closed(&mut stream).await;
    }

    #[tokio::test]
    async fn test_trickled_frame_times_out() {
        let fake = FakeApi::new();
        let (server, addr) = start_server(&fake, |_| {}).await;

        // Each byte lands well inside the read timeout, the frame as a whole does not
        let msg = ping_message();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        for byte in &msg[..8] {
            if stream.write_all(std::slice::from_ref(byte)).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_closed(&mut stream).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.stats().framing_errors_total.load(Ordering::Relaxed), 1);
        assert_eq!(server.stats().frames_total.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_truncated_connection_does_not_block_others() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |c| c.read_timeout = Duration::from_secs(10)).await;

        // Connection A stalls mid-frame and stays open
        let msg = ping_message();
        let mut stalled = TcpStream::connect(addr).await.unwrap();
        stalled.write_all(&msg[..msg.len() - 1]).await.unwrap();

        // Connection B is served meanwhile
        fake.expect("Host", "ping", json!("b"));
        let mut other = TcpStream::connect(addr).await.unwrap();
        other.write_all(&ping_message()).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(1), read_reply(&mut other))
            .await
            .expect("stalled connection blocked another")
            .unwrap();
        assert_eq!(reply["result"], "b");

        // Closing A leaves B usable
        drop(stalled);
        tokio::time::sleep(Duration::from_millis(50)).await;
        fake.expect("Host", "ping", json!("again"));
        other.write_all(&ping_message()).await.unwrap();
        assert_eq!(read_reply(&mut other).await.unwrap()["result"], "again");
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_cleanly() {
        let fake = FakeApi::new();
        let (server, addr) = start_server(&fake, |c| c.idle_timeout = Duration::from_millis(100)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        assert_closed(&mut stream).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.stats().errors_total.load(Ordering::Relaxed), 0);
        assert_eq!(server.stats().connections_active.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let fake = FakeApi::new();
        let (_server, addr) = start_server(&fake, |c| c.max_connections = 1).await;
        fake.expect("Host", "ping", json!(true));

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(&ping_message()).await.unwrap();
        read_reply(&mut first).await.unwrap();

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert_closed(&mut second).await;

        // The first connection is unaffected
        fake.expect("Host", "ping", json!(true));
        first.write_all(&ping_message()).await.unwrap();
        assert_eq!(read_reply(&mut first).await.unwrap()["result"], true);
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let fake = FakeApi::new();
        let (server, addr) = start_server(&fake, |_| {}).await;
        fake.expect("Host", "ping", json!(true));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&ping_message()).await.unwrap();
        read_reply(&mut stream).await.unwrap();
        assert!(server.is_running());

        server.shutdown();
        assert_closed(&mut stream).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!server.is_running());
    }

    #[test]
    fn test_server_config_from_config() {
        let mut config = Config::default();
        config.network.read_timeout_secs = 3;
        config.network.max_frame_bytes = 512;
        let server_config = ServerConfig::from_config(&config);

        assert_eq!(server_config.read_timeout, Duration::from_secs(3));
        assert_eq!(server_config.max_frame_bytes, 512);
        assert_eq!(server_config.bind_addr.port(), DEFAULT_PORT);
    }
}
