//! # bindrpc-protocol
//!
//! Wire protocol implementation for bindrpc.
//!
//! This crate provides:
//! - Binary framing with an 8-byte big-endian length prefix
//! - JSON-RPC 2.0 request/response envelope types
//! - Envelope validation and the error code taxonomy
//! - Response building for requests and notifications

pub mod codec;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{read_frame, write_frame, Decoder, Encoder};
pub use envelope::{validate, Rejected};
pub use error::{ErrorCode, ProtocolError, RpcError};
pub use frame::{Frame, FRAME_HEADER_SIZE};
pub use message::{Params, Request, Response};

/// JSON-RPC protocol version carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Default port for the bindrpc server.
pub const DEFAULT_PORT: u16 = 4044;

/// Default receive-side payload guard (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;
