//! Encoder and decoder for frames and messages.

use crate::error::ProtocolError;
use crate::frame::{Frame, FRAME_HEADER_SIZE};
use crate::message::{Request, Response};
use crate::DEFAULT_MAX_PAYLOAD_SIZE;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Encodes requests and responses into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a request into a frame.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        Ok(Frame::from_json(request)?.encode())
    }

    /// Encodes a response into a frame.
    pub fn encode_response(response: &Response) -> Result<BytesMut, ProtocolError> {
        Ok(Frame::from_json(response)?.encode())
    }

    /// Encodes any JSON-serializable value into a frame.
    pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<BytesMut, ProtocolError> {
        Ok(Frame::from_json(value)?.encode())
    }
}

/// Incremental frame decoder.
///
/// Bytes are appended as they arrive; complete frames are split off the
/// front of the buffer and anything after them is kept for the next call.
pub struct Decoder {
    buffer: BytesMut,
    max_payload: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Creates a decoder that rejects frames declaring more than
    /// `max_payload` bytes (`0` = unlimited).
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_payload,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer, self.max_payload)
    }

    /// Attempts to decode the next response from the buffer.
    pub fn decode_response(&mut self) -> Result<Option<Response>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame.payload)?)),
            None => Ok(None),
        }
    }

    /// Checks the buffer once the peer has stopped sending.
    ///
    /// An empty buffer is a clean end of stream; leftover bytes are a
    /// truncated frame.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        Err(ProtocolError::Truncated {
            buffered: self.buffer.len(),
            expected: self.expected_len(),
        })
    }

    /// Total bytes (header included) needed to complete the current frame.
    pub fn expected_len(&self) -> usize {
        match Frame::peek_len(&self.buffer) {
            Some(len) => FRAME_HEADER_SIZE.saturating_add(usize::try_from(len).unwrap_or(usize::MAX)),
            None => FRAME_HEADER_SIZE,
        }
    }

    /// Returns whether the length prefix has been fully received.
    pub fn awaiting_body(&self) -> bool {
        self.buffer.len() >= FRAME_HEADER_SIZE
    }

    /// Returns whether a partial frame is buffered.
    pub fn is_mid_frame(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the configured payload guard.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads exactly one frame from a sequential reader.
///
/// The length prefix and the body must each arrive within `timeout`. A short
/// read of either part is a framing error. The body is buffered as it arrives,
/// so a large declared length costs nothing until the bytes exist.
pub async fn read_frame<R>(
    reader: &mut R,
    timeout: Duration,
    max_payload: usize,
) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    read_exact_within(reader, &mut header, timeout).await?;

    let declared = u64::from_be_bytes(header);
    if max_payload > 0 && declared > max_payload as u64 {
        return Err(ProtocolError::FrameTooLarge {
            size: declared,
            max: max_payload,
        });
    }

    // The body buffer grows with the bytes that actually arrive.
    let mut payload = Vec::new();
    let read = tokio::time::timeout(
        timeout,
        (&mut *reader).take(declared).read_to_end(&mut payload),
    )
    .await;
    match read {
        Ok(Ok(n)) if n as u64 == declared => Ok(Bytes::from(payload)),
        Ok(Ok(_)) => Err(ProtocolError::ConnectionClosed),
        Ok(Err(e)) => Err(ProtocolError::Io(e)),
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Writes one frame carrying `payload`.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = Frame::new(Bytes::copy_from_slice(payload));
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_exact_within<R>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, reader.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        }
        Ok(Err(e)) => Err(ProtocolError::Io(e)),
        Err(_) => Err(ProtocolError::Timeout),
    }
}
