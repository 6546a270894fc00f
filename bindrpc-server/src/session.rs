//! Per-connection session state.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Where a connection is in its read-dispatch-respond cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first bytes of a length prefix.
    AwaitLength,
    /// Prefix complete; waiting for the declared number of payload bytes.
    AwaitBody,
    /// A complete frame is being validated and dispatched.
    Dispatch,
    /// A response is being written.
    Respond,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns whether moving from `self` to `next` is allowed.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            // A single read may deliver a header and its whole body
            (AwaitLength, AwaitBody) | (AwaitLength, Dispatch) => true,
            (AwaitBody, Dispatch) => true,
            // Notifications skip Respond
            (Dispatch, Respond) | (Dispatch, AwaitLength) => true,
            (Respond, AwaitLength) => true,
            // Trailing bytes after a frame may already hold the next header
            (Dispatch, AwaitBody) | (Respond, AwaitBody) => true,
            (Respond, Dispatch) | (Dispatch, Dispatch) => true,
            _ => false,
        }
    }
}

/// A client session.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    state: SessionState,

    /// Frames fully received.
    frames: u64,

    /// Responses written.
    responses: u64,

    /// Session creation time.
    created_at: Instant,

    /// When the frame currently being received began to arrive.
    frame_started: Option<Instant>,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::AwaitLength,
            frames: 0,
            responses: 0,
            created_at: Instant::now(),
            frame_started: None,
        }
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next`. Illegal transitions are logged and ignored.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition(next) {
            tracing::warn!(
                "[{}] Ignoring session transition {:?} -> {:?}",
                self.remote_addr,
                self.state,
                next
            );
            return false;
        }
        tracing::trace!("[{}] {:?} -> {:?}", self.remote_addr, self.state, next);
        self.state = next;
        true
    }

    /// Marks the session closed.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Returns when the partially received frame started, starting the
    /// clock on first call.
    pub fn begin_frame(&mut self) -> Instant {
        *self.frame_started.get_or_insert_with(Instant::now)
    }

    /// Records a complete frame.
    pub fn record_frame(&mut self) {
        self.frames += 1;
        self.frame_started = None;
    }

    /// Records a written response.
    pub fn record_response(&mut self) {
        self.responses += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn response_count(&self) -> u64 {
        self.responses
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}
