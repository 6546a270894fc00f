//! Binary frame format.
//!
//! Frame layout (8 bytes header + payload):
//!
//! ```text
//! +---------------------------+---------------------------+
//! | payload_len (u64, BE)     | payload                   |
//! | 8 bytes                   | payload_len bytes (JSON)  |
//! +---------------------------+---------------------------+
//! ```
//!
//! The length alone delimits a frame. Payload bytes are never inspected here,
//! so a malformed payload cannot shift the boundary of the next frame.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// A single length-prefixed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload (UTF-8 JSON by convention, not checked here).
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame with the given payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Creates a new frame from a JSON-serializable value.
    pub fn from_json<T: serde::Serialize>(value: &T) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(payload))
    }

    /// Encodes the frame into bytes. No size ceiling is applied.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.put_u64(self.payload.len() as u64);
        buf.put_slice(&self.payload);
        buf
    }

    /// Reads the declared payload length, if the header is complete.
    pub fn peek_len(buf: &[u8]) -> Option<u64> {
        let header: [u8; FRAME_HEADER_SIZE] = buf.get(..FRAME_HEADER_SIZE)?.try_into().ok()?;
        Some(u64::from_be_bytes(header))
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` if the declared length
    /// exceeds `max_payload` (`0` disables the check). Bytes after the
    /// frame are left in `buf`.
    pub fn decode(buf: &mut BytesMut, max_payload: usize) -> Result<Option<Self>, ProtocolError> {
        let Some(declared) = Self::peek_len(buf) else {
            return Ok(None);
        };

        if max_payload > 0 && declared > max_payload as u64 {
            return Err(ProtocolError::FrameTooLarge {
                size: declared,
                max: max_payload,
            });
        }

        let payload_len = usize::try_from(declared).map_err(|_| ProtocolError::FrameTooLarge {
            size: declared,
            max: usize::MAX,
        })?;

        if buf.len() - FRAME_HEADER_SIZE < payload_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Self { payload }))
    }
}
