//! Frame handling: validate, dispatch, build the response.

use crate::metrics::{Metrics, UNKNOWN_METHOD_LABEL};
use bindrpc_bridge::Bridge;
use bindrpc_protocol::{validate, Params, Response, RpcError};
use serde_json::Value;
use std::sync::Arc;

/// Turns one frame payload into at most one response.
pub struct RequestHandler {
    bridge: Arc<Bridge>,
    /// Metrics for request tracking.
    metrics: Option<Arc<Metrics>>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Handles one complete frame payload.
    ///
    /// Returns `None` when nothing must be written back, which is the case
    /// for every notification whatever its outcome.
    pub async fn handle_frame(&self, payload: &[u8]) -> Option<Response> {
        let request = match validate(payload) {
            Ok(request) => request,
            Err(rejected) => {
                tracing::debug!("Rejected frame: {}", rejected.error);
                self.record_error(&rejected.error);
                return Response::build(rejected.id, Err(rejected.error));
            }
        };

        let label = if self.bridge.contains(&request.method) {
            request.method.clone()
        } else {
            UNKNOWN_METHOD_LABEL.to_string()
        };
        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[label.as_str()])
                .start_timer()
        });

        let notification = request.is_notification();
        let outcome = self.dispatch(request.method, request.params).await;

        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[label.as_str()]).inc();
            if notification {
                metrics.notifications_total.inc();
            }
        }
        drop(timer); // Observation happens on drop

        if let Err(ref error) = outcome {
            tracing::debug!("Dispatch of {} failed: {}", label, error);
            self.record_error(error);
        }

        Response::build(request.id, outcome)
    }

    /// Runs a bridge call on the blocking pool.
    pub async fn dispatch(&self, method: String, params: Params) -> Result<Value, RpcError> {
        let bridge = Arc::clone(&self.bridge);
        match tokio::task::spawn_blocking(move || bridge.dispatch(&method, params)).await {
            Ok(result) => result.map_err(RpcError::from),
            Err(e) => Err(RpcError::internal(format!("dispatch task failed: {}", e))),
        }
    }

    fn record_error(&self, error: &RpcError) {
        if let Some(ref metrics) = self.metrics {
            metrics
                .errors_total
                .with_label_values(&[error.code.name()])
                .inc();
        }
    }
}
