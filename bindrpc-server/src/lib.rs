//! # bindrpc-server
//!
//! TCP listener for bindrpc.
//!
//! This crate provides:
//! - Per-connection framing with resynchronization
//! - Envelope validation and dispatch through the method bridge
//! - Session state tracking
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, MetricsConfig, NetworkConfig, };
pub use error::ServerError;
pub use handler::RequestHandler;
pub use metrics::{run_metrics_server, Metrics};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::{Session, SessionState};
