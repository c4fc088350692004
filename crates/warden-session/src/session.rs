//! Per-connection protocol state.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;
use warden_registry::Owned;

use crate::crypto::{self, RecvKey, SendKey};
use crate::error::{SessionError, SessionResult};
use crate::frame::{self, Decoded, FrameBuffer};
use crate::handler::{self, SessionContext, Transport};
use crate::message::{Message, PingMsg, PubkeyMsg};
use crate::types::{ConnectionId, RoleId, RoleState};

/// Mutable state, only touched from the owning connection's callbacks.
struct SessionState {
    role: RoleState,
    /// Shared with handler contexts so replies draw from the same counter.
    sender: Option<Arc<Mutex<SendKey>>>,
    receiver: Option<RecvKey>,
    pending_nonce: Option<u64>,
    misses: u32,
    buffer: FrameBuffer,
    closing: bool,
}

/// Result of feeding received bytes through the decoder.
#[derive(Default)]
pub(crate) struct Inbound {
    /// Application frames in arrival order.
    pub frames: Vec<(u8, Vec<u8>)>,
    /// Context for dispatching `frames`.
    pub context: Option<SessionContext>,
    /// Violation that stopped decoding.
    pub error: Option<SessionError>,
}

/// One connection's handshake, heartbeat and framing state.
pub struct Session {
    id: ConnectionId,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, transport: Arc<dyn Transport>, max_buffer: usize) -> Self {
        Self {
            id,
            transport,
            state: Mutex::new(SessionState {
                role: RoleState::Unkeyed,
                sender: None,
                receiver: None,
                pending_nonce: None,
                misses: 0,
                buffer: FrameBuffer::new(max_buffer),
                closing: false,
            }),
        }
    }

    /// Connection this session belongs to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current role state.
    #[must_use]
    pub fn role(&self) -> RoleState {
        self.state.lock().role
    }

    /// Outstanding heartbeat nonce, if a challenge is unanswered.
    #[must_use]
    pub fn pending_nonce(&self) -> Option<u64> {
        self.state.lock().pending_nonce
    }

    /// Undecoded bytes held for this connection.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// True once the session has asked for its connection to close.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.state.lock().closing
    }

    /// Append `bytes` and decode every complete frame.
    ///
    /// Control messages are handled here; application frames are returned
    /// for dispatch outside the lock. Decoding stops at the first violation.
    pub(crate) fn ingest(&self, bytes: &[u8], max_frame_size: usize) -> Inbound {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut inbound = Inbound::default();
        if state.closing {
            return inbound;
        }

        if let Err(err) = state.buffer.extend(bytes) {
            inbound.error = Some(err);
        }
        while inbound.error.is_none() {
            let decoded =
                frame::decode(state.buffer.contiguous(), state.receiver.as_mut(), max_frame_size);
            let (message, consumed) = match decoded {
                Ok(Decoded::Complete { message, consumed }) => (message, consumed),
                Ok(Decoded::Incomplete) => break,
                Err(err) => {
                    inbound.error = Some(err.into());
                    break;
                }
            };
            state.buffer.consume(consumed);

            let handled = match message {
                Message::Pubkey(peer) => self.handshake(state, &peer),
                Message::Ping(reply) => Self::verify_reply(state, reply),
                Message::App { kind, payload } if state.role.is_keyed() => {
                    inbound.frames.push((kind, payload));
                    Ok(())
                }
                Message::App { .. } => Err(SessionError::UnexpectedMessage {
                    kind: "application frame",
                    state: state.role.name(),
                }),
            };
            if let Err(err) = handled {
                inbound.error = Some(err);
            }
        }

        if inbound.error.is_some() {
            state.closing = true;
        }
        if !inbound.frames.is_empty() {
            inbound.context = state.sender.as_ref().map(|sender| {
                SessionContext::new(
                    self.id,
                    state.role,
                    Arc::clone(sender),
                    Arc::clone(&self.transport),
                )
            });
        }
        inbound
    }

    fn handshake(&self, state: &mut SessionState, peer: &PubkeyMsg) -> SessionResult<()> {
        if state.role != RoleState::Unkeyed {
            return Err(SessionError::UnexpectedMessage {
                kind: "PubkeyMsg",
                state: state.role.name(),
            });
        }
        let (reply, keys) = crypto::respond(peer)?;
        // The reply goes out in the clear; the peer has no key yet
        self.transport
            .send(frame::encode(&Message::Pubkey(reply), None)?);
        state.sender = Some(Arc::new(Mutex::new(keys.send)));
        state.receiver = Some(keys.recv);
        state.role = RoleState::Keyed;
        debug!(conn = %self.id, "Session keyed");
        Ok(())
    }

    fn verify_reply(state: &mut SessionState, reply: PingMsg) -> SessionResult<()> {
        if !state.role.is_keyed() {
            return Err(SessionError::UnexpectedMessage {
                kind: "PingMsg",
                state: state.role.name(),
            });
        }
        let Some(nonce) = state.pending_nonce else {
            return Err(SessionError::UnsolicitedHeartbeat(reply.verification_key));
        };
        let expected = nonce.wrapping_add(1);
        if reply.verification_key != expected {
            return Err(SessionError::HeartbeatMismatch {
                expected,
                received: reply.verification_key,
            });
        }
        state.pending_nonce = None;
        state.misses = 0;
        Ok(())
    }

    fn send_ping(&self, state: &mut SessionState, nonce: u64) -> SessionResult<()> {
        let sender = state.sender.as_ref().ok_or(SessionError::NotKeyed(self.id))?;
        let ping = Message::Ping(PingMsg {
            verification_key: nonce,
        });
        handler::send_sealed(sender, self.transport.as_ref(), &ping)?;
        state.pending_nonce = Some(nonce);
        Ok(())
    }

    /// Send a heartbeat challenge with an explicit nonce.
    pub(crate) fn challenge(&self, nonce: u64) -> SessionResult<()> {
        let mut state = self.state.lock();
        if !state.role.is_authenticated() {
            return Err(SessionError::NotAuthenticated(self.id));
        }
        self.send_ping(&mut state, nonce)
    }

    /// Periodic liveness check.
    ///
    /// A challenge still outstanding counts as a miss and is sent again;
    /// reaching `miss_limit` (when non-zero) fails. Returns whether a
    /// challenge was sent.
    pub(crate) fn heartbeat(&self, miss_limit: u32) -> SessionResult<bool> {
        let mut state = self.state.lock();
        if state.closing || !state.role.is_authenticated() {
            return Ok(false);
        }
        let nonce = match state.pending_nonce {
            Some(outstanding) => {
                state.misses += 1;
                if miss_limit > 0 && state.misses >= miss_limit {
                    state.closing = true;
                    return Err(SessionError::HeartbeatMissed(state.misses));
                }
                outstanding
            }
            None => rand::thread_rng().gen_range(1..=u64::MAX),
        };
        self.send_ping(&mut state, nonce)?;
        Ok(true)
    }

    /// Upgrade a keyed session to authenticated.
    pub(crate) fn authenticate(&self, role: RoleId) -> SessionResult<()> {
        let mut state = self.state.lock();
        if state.role != RoleState::Keyed {
            return Err(SessionError::InvalidTransition {
                from: state.role.name(),
                to: "authenticated",
            });
        }
        state.role = RoleState::Authenticated(role);
        Ok(())
    }

    /// Send a sealed application frame.
    pub(crate) fn send(&self, kind: u8, payload: Vec<u8>) -> SessionResult<()> {
        let message = Message::app(kind, payload)?;
        let sender = self
            .state
            .lock()
            .sender
            .clone()
            .ok_or(SessionError::NotKeyed(self.id))?;
        handler::send_sealed(&sender, self.transport.as_ref(), &message)?;
        Ok(())
    }

    /// Stop processing input and ask the transport to close.
    pub(crate) fn abort(&self) {
        self.state.lock().closing = true;
        self.transport.request_close();
    }
}

impl Owned for Session {
    fn destroy(&self) {
        let mut state = self.state.lock();
        state.sender = None;
        state.receiver = None;
        state.pending_nonce = None;
        state.buffer.clear();
        state.closing = true;
        debug!(conn = %self.id, "Session destroyed");
    }

    fn force_close(&self) {
        self.transport.request_close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role())
            .finish_non_exhaustive()
    }
}
