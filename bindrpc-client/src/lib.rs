//! # bindrpc-client
//!
//! Client library for bindrpc.
//!
//! This crate provides:
//! - Async TCP connection speaking length-prefixed JSON-RPC 2.0
//! - Calls, notifications and raw frame exchange
//! - Helpers for the built-in `Host` methods

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
