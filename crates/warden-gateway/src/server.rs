//! TCP gateway: accept loop and per-connection tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_admission::{AdmissionControl, AdmissionStatus, ConnectionPermit};
use warden_session::{ConnectionId, MessageHandler, SessionEngine};

use crate::config::GatewayConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RateLimitedHandler;
use crate::transport::{self, TcpTransport};

/// Point-in-time gateway counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStatus {
    /// Registered sessions.
    pub live_sessions: usize,
    /// Connections refused by the concurrency limiter.
    pub rejected_connections: u64,
    /// Application frames dropped by the rate limiter.
    pub dropped_frames: u64,
    /// Limiter state.
    pub admission: AdmissionStatus,
}

/// Gateway serving sessions over TCP.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    admission: Arc<AdmissionControl>,
    engine: SessionEngine,
    limited: Arc<RateLimitedHandler>,
    next_id: AtomicU64,
    rejected: AtomicU64,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Create a gateway dispatching application frames to `handler`.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: GatewayConfig, handler: Arc<dyn MessageHandler>) -> ServerResult<Self> {
        config.validate()?;
        let admission = Arc::new(AdmissionControl::new(&config.admission)?);
        let limited = Arc::new(RateLimitedHandler::new(handler, Arc::clone(&admission)));
        let engine = SessionEngine::new(config.session.clone(), limited.clone())?;
        Ok(Self {
            config,
            admission,
            engine,
            limited,
            next_id: AtomicU64::new(1),
            rejected: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        })
    }

    /// Get the gateway configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The session engine.
    #[must_use]
    pub const fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    /// Admission control shared by all connections.
    #[must_use]
    pub const fn admission(&self) -> &Arc<AdmissionControl> {
        &self.admission
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.engine.live_count()
    }

    /// Current counters.
    #[must_use]
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            live_sessions: self.engine.live_count(),
            rejected_connections: self.rejected.load(Ordering::Relaxed),
            dropped_frames: self.limited.dropped(),
            admission: self.admission.status(),
        }
    }

    /// Replace the connection and request limits live.
    pub fn update_limits(&self, max_connections: i64, max_qps: i64) {
        self.admission.update(max_connections, max_qps);
    }

    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(&self) -> ServerResult<TcpListener> {
        let addr = self.config.bind_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e))
    }

    /// Bind the configured address and serve until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn run(self: Arc<Self>) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Begin shutdown.
    ///
    /// [`serve`](Self::serve) stops accepting, asks every live session to
    /// close, and returns once they finish or the grace period ends.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Accept connections from `listener` until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's address cannot be read.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> ServerResult<()> {
        let local = listener.local_addr()?;
        info!(addr = %local, "Gateway listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer, &mut connections),
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
        drop(listener);

        let requested = self.engine.registry().clear();
        info!(
            live = requested,
            grace_ms = self.config.shutdown_grace.as_millis() as u64,
            "Gateway shutting down"
        );
        let drained = time::timeout(self.config.shutdown_grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "Shutdown grace period elapsed; aborting connections"
            );
            connections.shutdown().await;
            // Aborted tasks never reported their close
            for id in self.engine.registry().ids() {
                self.engine.closed(id);
            }
        }
        info!("Gateway stopped");
        Ok(())
    }

    fn admit(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr, connections: &mut JoinSet<()>) {
        let Some(permit) = self.admission.try_acquire_connection() else {
            let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(peer = %peer, rejected, "Connection rejected: concurrency limit");
            return;
        };
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let gateway = Arc::clone(self);
        connections.spawn(async move {
            gateway.run_connection(id, peer, stream, permit).await;
        });
    }

    /// Drive one connection from accept to close.
    ///
    /// Reads, heartbeats and close requests are handled by this one task in
    /// order, so the engine never sees concurrent calls for `id`.
    async fn run_connection(
        &self,
        id: ConnectionId,
        peer: SocketAddr,
        stream: TcpStream,
        _permit: ConnectionPermit,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(conn = %id, error = %e, "Failed to set TCP_NODELAY");
        }
        let (mut reader, writer) = stream.into_split();
        let close = CancellationToken::new();
        let (transport, outbound) = TcpTransport::new(close.clone(), self.config.outbound_queue_size);
        let mut writer_task = tokio::spawn(transport::run_writer(writer, outbound, close.clone()));

        self.engine.accept(id, Arc::new(transport));
        debug!(conn = %id, peer = %peer, "Connection open");
        // Registered after shutdown cleared the registry
        if self.shutdown.is_cancelled() {
            close.cancel();
        }

        let mut buf = vec![0u8; self.config.read_buffer_size];
        let interval = self.config.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let handshake_deadline = time::sleep(self.config.handshake_timeout);
        tokio::pin!(handshake_deadline);
        let mut awaiting_key = true;

        loop {
            tokio::select! {
                biased;
                () = close.cancelled() => break,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!(conn = %id, "Peer closed connection");
                        break;
                    }
                    Ok(n) => {
                        if self.engine.receive(id, &buf[..n]).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(conn = %id, error = %e, "Read failed");
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    if self.engine.heartbeat(id).is_err() {
                        break;
                    }
                }
                () = &mut handshake_deadline, if awaiting_key => {
                    awaiting_key = false;
                    if self.engine.role(id).is_some_and(|role| !role.is_keyed()) {
                        warn!(conn = %id, peer = %peer, "Handshake timed out");
                        break;
                    }
                }
            }
        }

        close.cancel();
        if time::timeout(self.config.shutdown_grace, &mut writer_task)
            .await
            .is_err()
        {
            writer_task.abort();
        }
        self.engine.closed(id);
        debug!(conn = %id, "Connection finished");
    }
}
