//! Seams between the session engine and its surroundings.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::crypto::SendKey;
use crate::error::{FrameError, SessionResult};
use crate::frame;
use crate::message::Message;
use crate::types::{ConnectionId, RoleState};

/// Write path of one connection, provided by the substrate.
///
/// Both calls are fire-and-forget and must not block.
pub trait Transport: Send + Sync {
    /// Queue encoded bytes for sending.
    fn send(&self, bytes: Vec<u8>);

    /// Ask the substrate to close the connection.
    ///
    /// Teardown finishes when the substrate reports the close back.
    fn request_close(&self);
}

/// Receives application frames, i.e. anything that is not a control message.
pub trait MessageHandler: Send + Sync {
    /// Handle one application frame.
    ///
    /// Returning an error closes the connection.
    fn handle(&self, ctx: &SessionContext, kind: u8, payload: Vec<u8>) -> SessionResult<()>;
}

/// What a [`MessageHandler`] knows about the sending connection.
#[derive(Clone)]
pub struct SessionContext {
    id: ConnectionId,
    role: RoleState,
    sender: Arc<Mutex<SendKey>>,
    transport: Arc<dyn Transport>,
}

impl SessionContext {
    pub(crate) fn new(
        id: ConnectionId,
        role: RoleState,
        sender: Arc<Mutex<SendKey>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id,
            role,
            sender,
            transport,
        }
    }

    /// The connection the frame arrived on.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Role state when the frame was decoded.
    #[must_use]
    pub const fn role(&self) -> RoleState {
        self.role
    }

    /// Send a sealed application frame back to the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if `kind` is reserved or the frame cannot be sealed.
    pub fn reply(&self, kind: u8, payload: impl Into<Vec<u8>>) -> SessionResult<()> {
        let message = Message::app(kind, payload)?;
        send_sealed(&self.sender, self.transport.as_ref(), &message)?;
        Ok(())
    }
}

/// Seal `message` and queue it on `transport`.
///
/// The sender stays locked until the frame is queued, so frames leave in
/// counter order even when several threads reply at once.
pub(crate) fn send_sealed(
    sender: &Mutex<SendKey>,
    transport: &dyn Transport,
    message: &Message,
) -> Result<(), FrameError> {
    let mut sender = sender.lock();
    let frame = frame::encode(message, Some(&mut *sender))?;
    transport.send(frame);
    Ok(())
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Handler that accepts and drops every application frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardHandler;

impl MessageHandler for DiscardHandler {
    fn handle(&self, _ctx: &SessionContext, _kind: u8, _payload: Vec<u8>) -> SessionResult<()> {
        Ok(())
    }
}
