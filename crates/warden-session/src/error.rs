//! Error types for the session protocol.

use thiserror::Error;

use crate::types::ConnectionId;

/// A frame could not be decoded or encoded.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Length prefix of zero.
    #[error("empty frame")]
    Empty,

    /// Length prefix above the configured maximum.
    #[error("frame length {len} exceeds maximum {max}")]
    TooLarge {
        /// Declared length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Sealed body too short to hold a nonce, tag and kind byte.
    #[error("sealed frame too short: {0} bytes")]
    Truncated(usize),

    /// Message kind in the reserved range.
    #[error("reserved message kind 0x{0:02x}")]
    ReservedKind(u8),

    /// Decryption or MAC check failed.
    #[error("frame authentication failed")]
    Authentication,

    /// Authentic frame carrying the wrong counter: replayed, reordered or
    /// dropped upstream.
    #[error("frame counter {received} out of sequence, expected {expected}")]
    Replay {
        /// Counter the receiver was waiting for.
        expected: u64,
        /// Counter the frame carried.
        received: u64,
    },

    /// Encryption failed.
    #[error("frame encryption failed: {0}")]
    Encryption(String),

    /// Control message payload could not be parsed or produced.
    #[error("invalid {kind} payload: {reason}")]
    Payload {
        /// Message kind name.
        kind: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// Errors raised by the session engine.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed or unauthenticated frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Message not valid in the session's current state.
    #[error("unexpected {kind} while {state}")]
    UnexpectedMessage {
        /// Message kind name.
        kind: &'static str,
        /// Role state name.
        state: &'static str,
    },

    /// Key exchange failed.
    #[error("key exchange failed: {0}")]
    KeyExchange(String),

    /// Heartbeat reply carried the wrong value.
    #[error("heartbeat mismatch: expected {expected}, got {received}")]
    HeartbeatMismatch {
        /// Value that would have matched.
        expected: u64,
        /// Value the peer sent.
        received: u64,
    },

    /// Heartbeat reply with no challenge outstanding.
    #[error("unsolicited heartbeat reply {0}")]
    UnsolicitedHeartbeat(u64),

    /// Too many heartbeats went unanswered.
    #[error("{0} heartbeat(s) unanswered")]
    HeartbeatMissed(u32),

    /// Inbound buffer grew past its bound.
    #[error("inbound buffer of {size} bytes exceeds limit {max}")]
    BufferOverflow {
        /// Bytes that would have been buffered.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Role state change not allowed from the current state.
    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current state name.
        from: &'static str,
        /// Requested state name.
        to: &'static str,
    },

    /// Operation needs an established session secret.
    #[error("connection {0} has no session secret")]
    NotKeyed(ConnectionId),

    /// Operation needs an authenticated session.
    #[error("connection {0} is not authenticated")]
    NotAuthenticated(ConnectionId),

    /// No live session under this id.
    #[error("connection {0} not found")]
    NotFound(ConnectionId),

    /// The application handler rejected a frame.
    #[error("handler error: {0}")]
    Handler(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// True for failures caused by the peer breaking the protocol.
    ///
    /// These close the connection and are never retried.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Frame(_)
                | Self::UnexpectedMessage { .. }
                | Self::KeyExchange(_)
                | Self::HeartbeatMismatch { .. }
                | Self::UnsolicitedHeartbeat(_)
                | Self::HeartbeatMissed(_)
                | Self::BufferOverflow { .. }
        )
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
