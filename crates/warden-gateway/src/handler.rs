//! Application frame handlers installed by the gateway.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use warden_admission::AdmissionControl;
use warden_session::{MessageHandler, SessionContext, SessionResult};

/// Gates application frames on the request rate limiter.
///
/// Frames over the configured rate are dropped, not treated as violations.
pub struct RateLimitedHandler {
    inner: Arc<dyn MessageHandler>,
    admission: Arc<AdmissionControl>,
    dropped: AtomicU64,
}

impl RateLimitedHandler {
    /// Wrap `inner` behind `admission`'s rate limiter.
    #[must_use]
    pub fn new(inner: Arc<dyn MessageHandler>, admission: Arc<AdmissionControl>) -> Self {
        Self {
            inner,
            admission,
            dropped: AtomicU64::new(0),
        }
    }

    /// Frames dropped for exceeding the rate limit.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl MessageHandler for RateLimitedHandler {
    fn handle(&self, ctx: &SessionContext, kind: u8, payload: Vec<u8>) -> SessionResult<()> {
        if !self.admission.acquire_request() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(conn = %ctx.id(), kind, dropped, "Frame rejected: rate limit");
            return Ok(());
        }
        self.inner.handle(ctx, kind, payload)
    }
}

impl std::fmt::Debug for RateLimitedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedHandler")
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

/// Sends every application frame back to its sender.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl MessageHandler for EchoHandler {
    fn handle(&self, ctx: &SessionContext, kind: u8, payload: Vec<u8>) -> SessionResult<()> {
        ctx.reply(kind, payload)
    }
}
