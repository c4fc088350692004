//! Connection callbacks driving every live session.

use std::sync::Arc;

use tracing::{debug, info, warn};
use warden_registry::{Handle, Registry};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::handler::{MessageHandler, Transport};
use crate::session::{Inbound, Session};
use crate::types::{ConnectionId, RoleId, RoleState};

/// Session protocol engine shared by all connections.
///
/// The substrate calls [`accept`](Self::accept), then any sequence of
/// [`receive`](Self::receive) and [`heartbeat`](Self::heartbeat), and finally
/// [`closed`](Self::closed), never concurrently for the same connection.
/// Any protocol violation requests a close on that connection only.
pub struct SessionEngine {
    registry: Arc<Registry<ConnectionId, Session>>,
    config: SessionConfig,
    handler: Arc<dyn MessageHandler>,
}

impl SessionEngine {
    /// Create an engine dispatching application frames to `handler`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SessionConfig, handler: Arc<dyn MessageHandler>) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(Registry::new()),
            config,
            handler,
        })
    }

    /// Start a session for a newly accepted connection.
    ///
    /// # Panics
    ///
    /// Panics if `id` is still registered from an earlier connection.
    pub fn accept(&self, id: ConnectionId, transport: Arc<dyn Transport>) {
        let session = Session::new(id, transport, self.config.max_buffer_size);
        self.registry.register(id, session);
        debug!(conn = %id, "Connection accepted");
    }

    /// Feed bytes read from the connection.
    ///
    /// # Errors
    ///
    /// Returns the violation that closed the connection, or
    /// [`SessionError::NotFound`] for an unknown id.
    pub fn receive(&self, id: ConnectionId, bytes: &[u8]) -> SessionResult<()> {
        let session = self.lookup(id)?;
        let Inbound {
            frames,
            context,
            error,
        } = session.ingest(bytes, self.config.max_frame_size);

        if let Some(ctx) = context {
            for (kind, payload) in frames {
                if let Err(err) = self.handler.handle(&ctx, kind, payload) {
                    return Err(self.fail(&session, err));
                }
            }
        }
        match error {
            Some(err) => Err(self.fail(&session, err)),
            None => Ok(()),
        }
    }

    /// Periodic liveness check for an authenticated connection.
    ///
    /// Does nothing before authentication.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HeartbeatMissed`] once too many challenges
    /// went unanswered; the connection is closed.
    pub fn heartbeat(&self, id: ConnectionId) -> SessionResult<()> {
        let session = self.lookup(id)?;
        match session.heartbeat(self.config.heartbeat_miss_limit) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(&session, err)),
        }
    }

    /// Send a heartbeat challenge with a caller-chosen nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unknown or not authenticated.
    pub fn challenge(&self, id: ConnectionId, nonce: u64) -> SessionResult<()> {
        self.lookup(id)?.challenge(nonce)
    }

    /// Mark a keyed connection as authenticated for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] unless the session is
    /// exactly `Keyed`.
    pub fn authenticate(&self, id: ConnectionId, role: RoleId) -> SessionResult<()> {
        self.lookup(id)?.authenticate(role)?;
        info!(conn = %id, role = %role, "Session authenticated");
        Ok(())
    }

    /// Send a sealed application frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unknown or not yet keyed, or if
    /// `kind` is reserved.
    pub fn send(&self, id: ConnectionId, kind: u8, payload: impl Into<Vec<u8>>) -> SessionResult<()> {
        self.lookup(id)?.send(kind, payload.into())
    }

    /// The connection has closed. Returns `false` if it was not registered.
    pub fn closed(&self, id: ConnectionId) -> bool {
        let removed = self.registry.unregister(&id);
        debug!(conn = %id, removed, "Connection closed");
        removed
    }

    /// Role state of a live connection.
    #[must_use]
    pub fn role(&self, id: ConnectionId) -> Option<RoleState> {
        self.registry.get(&id).map(|session| session.role())
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.registry.len()
    }

    /// The registry of live sessions.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry<ConnectionId, Session>> {
        &self.registry
    }

    /// The configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn lookup(&self, id: ConnectionId) -> SessionResult<Handle<Session>> {
        self.registry.get(&id).ok_or(SessionError::NotFound(id))
    }

    fn fail(&self, session: &Session, err: SessionError) -> SessionError {
        warn!(
            conn = %session.id(),
            violation = err.is_protocol_violation(),
            error = %err,
            "Closing connection"
        );
        session.abort();
        err
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("live", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
