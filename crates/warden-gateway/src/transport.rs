//! TCP write path handed to the session engine.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warden_session::Transport;

/// Receiving end of a connection's outbound queue.
pub type OutboundReceiver = mpsc::Receiver<Vec<u8>>;

/// [`Transport`] backed by a writer task.
///
/// Frames are queued without blocking on a bounded queue. A peer that
/// stops reading fills it; the next frame then closes the connection
/// instead of growing the queue. Closing cancels the connection's token,
/// which ends both its read loop and its writer.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    outbound: mpsc::Sender<Vec<u8>>,
    close: CancellationToken,
}

impl TcpTransport {
    /// Create a transport and the queue its writer drains, holding at most
    /// `capacity` frames.
    #[must_use]
    pub fn new(close: CancellationToken, capacity: usize) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        (Self { outbound, close }, rx)
    }

    /// Token cancelled when a close is requested.
    #[must_use]
    pub const fn close_token(&self) -> &CancellationToken {
        &self.close
    }
}

impl Transport for TcpTransport {
    fn send(&self, bytes: Vec<u8>) {
        match self.outbound.try_send(bytes) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(
                    capacity = self.outbound.max_capacity(),
                    "Outbound queue full; closing slow peer"
                );
                self.close.cancel();
            }
            Err(TrySendError::Closed(_)) => debug!("Dropping frame for closed connection"),
        }
    }

    fn request_close(&self) {
        self.close.cancel();
    }
}

/// Write queued frames until the queue ends or `close` fires.
///
/// Frames already queued when the close arrives are still flushed, so a
/// reply sent just before closing reaches the peer.
pub async fn run_writer<W>(mut writer: W, mut outbound: OutboundReceiver, close: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = writer.write_all(&frame).await {
                    debug!(error = %e, "Write failed");
                    close.cancel();
                    return;
                }
            }
            () = close.cancelled() => {
                while let Ok(frame) = outbound.try_recv() {
                    if writer.write_all(&frame).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}
