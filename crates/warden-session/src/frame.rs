//! Length-delimited frame codec and the per-connection inbound buffer.
//!
//! ```text
//! frame  = length:u32 (big endian) || body[length]
//! plain  = kind:u8 || payload
//! sealed = nonce[12] || ChaCha20-Poly1305(kind:u8 || payload)
//! nonce  = 0u32 || counter:u64 (big endian, per direction)
//! ```
//!
//! Decoding distinguishes a frame that is merely incomplete from one that is
//! malformed: a split TCP segment must never close the connection.

use std::collections::VecDeque;

use crate::crypto::{NONCE_SIZE, RecvKey, SendKey, TAG_SIZE};
use crate::error::{FrameError, SessionError, SessionResult};
use crate::message::Message;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Smallest sealed body: nonce, tag and one kind byte.
pub const MIN_SEALED_SIZE: usize = NONCE_SIZE + TAG_SIZE + 1;

/// Outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A whole frame was parsed.
    Complete {
        /// The decoded message.
        message: Message,
        /// Bytes the frame occupied, prefix included.
        consumed: usize,
    },
    /// More bytes are needed.
    Incomplete,
}

/// Encode `message` as one frame, sealed when `key` is present.
///
/// Sealing consumes one counter from `key`, so frames must reach the peer
/// in the order they were encoded.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized, sealing fails, or
/// the body does not fit the length prefix.
pub fn encode(message: &Message, key: Option<&mut SendKey>) -> Result<Vec<u8>, FrameError> {
    let payload = message.payload_bytes()?;
    let mut plain = Vec::with_capacity(1 + payload.len());
    plain.push(message.kind());
    plain.extend_from_slice(&payload);

    let body = match key {
        Some(key) => key.seal(&plain)?,
        None => plain,
    };
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge {
        len: body.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Try to decode one frame from the front of `buf`.
///
/// The length prefix is checked against `max_frame_size` before the body
/// arrives, so an oversized frame fails without being buffered.
///
/// # Errors
///
/// Returns an error if the frame is malformed, fails authentication or is
/// out of sequence. `key` only advances on a successfully opened frame.
pub fn decode(
    buf: &[u8],
    key: Option<&mut RecvKey>,
    max_frame_size: usize,
) -> Result<Decoded, FrameError> {
    let Some((prefix, rest)) = buf.split_first_chunk::<LENGTH_PREFIX_SIZE>() else {
        return Ok(Decoded::Incomplete);
    };
    let len = u32::from_be_bytes(*prefix) as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > max_frame_size {
        return Err(FrameError::TooLarge {
            len,
            max: max_frame_size,
        });
    }
    let Some(body) = rest.get(..len) else {
        return Ok(Decoded::Incomplete);
    };

    let plain = match key {
        Some(key) => {
            if body.len() < MIN_SEALED_SIZE {
                return Err(FrameError::Truncated(body.len()));
            }
            key.open(body)?
        }
        None => body.to_vec(),
    };
    let Some((&kind, payload)) = plain.split_first() else {
        return Err(FrameError::Empty);
    };

    Ok(Decoded::Complete {
        message: Message::from_parts(kind, payload)?,
        consumed: LENGTH_PREFIX_SIZE + len,
    })
}

/// Growable ring buffer of undecoded inbound bytes.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    bytes: VecDeque<u8>,
    max: usize,
}

impl FrameBuffer {
    /// Create an empty buffer holding at most `max` bytes.
    #[must_use]
    pub const fn new(max: usize) -> Self {
        Self {
            bytes: VecDeque::new(),
            max,
        }
    }

    /// Append newly received bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::BufferOverflow`] if the buffer would exceed
    /// its bound; nothing is appended in that case.
    pub fn extend(&mut self, data: &[u8]) -> SessionResult<()> {
        let size = self.bytes.len() + data.len();
        if size > self.max {
            return Err(SessionError::BufferOverflow {
                size,
                max: self.max,
            });
        }
        self.bytes.extend(data);
        Ok(())
    }

    /// Buffered bytes as one slice.
    pub fn contiguous(&mut self) -> &[u8] {
        self.bytes.make_contiguous()
    }

    /// Drop `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.bytes.len());
        self.bytes.drain(..n);
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Discard everything and release the allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.bytes.shrink_to_fit();
    }
}
