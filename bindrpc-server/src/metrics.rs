//! Prometheus metrics for the bindrpc server.
//!
//! This module provides:
//! - Metrics registry with counters, gauges, and histograms
//! - HTTP server to expose metrics at `/metrics` endpoint

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Request duration histogram buckets (in seconds).
const DURATION_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Label used for methods outside the allow-list, so arbitrary client input
/// cannot grow the label set.
pub const UNKNOWN_METHOD_LABEL: &str = "unknown";

/// Prometheus metrics for the bindrpc server.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total connections accepted.
    pub connections_total: Counter,
    /// Currently active connections.
    pub connections_active: Gauge,
    /// Dispatched requests by method.
    pub requests_total: CounterVec,
    /// Notifications dispatched (no response written).
    pub notifications_total: Counter,
    /// Error responses by error kind.
    pub errors_total: CounterVec,
    /// Connections closed for a framing error.
    pub framing_errors_total: Counter,
    /// Dispatch duration by method.
    pub request_duration: HistogramVec,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_total = Counter::with_opts(Opts::new(
            "bindrpc_connections_total",
            "Total number of connections accepted",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let connections_active = Gauge::with_opts(Opts::new(
            "bindrpc_connections_active",
            "Number of currently active connections",
        ))?;
        registry.register(Box::new(connections_active.clone()))?;

        let requests_total = CounterVec::new(
            Opts::new("bindrpc_requests_total", "Total dispatched requests by method"),
            &["method"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let notifications_total = Counter::with_opts(Opts::new(
            "bindrpc_notifications_total",
            "Total notifications dispatched",
        ))?;
        registry.register(Box::new(notifications_total.clone()))?;

        let errors_total = CounterVec::new(
            Opts::new("bindrpc_errors_total", "Total error responses by kind"),
            &["code"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let framing_errors_total = Counter::with_opts(Opts::new(
            "bindrpc_framing_errors_total",
            "Connections closed because frame boundaries were lost",
        ))?;
        registry.register(Box::new(framing_errors_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "bindrpc_request_duration_seconds",
                "Dispatch duration in seconds by method",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            requests_total,
            notifications_total,
            errors_total,
            framing_errors_total,
            request_duration,
        })
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Runs the HTTP metrics server.
///
/// The server listens on the given address and serves metrics at `/metrics`.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    route(req.uri().path(), &metrics)
}

fn route(path: &str, metrics: &Metrics) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    match path {
        "/metrics" => match metrics.encode() {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body))),
            Err(e) => {
                tracing::warn!("Failed to encode metrics: {}", e);
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::from(e.to_string())))
            }
        },
        "/health" | "/healthz" => Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("OK"))),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found"))),
    }
}
