//! Concurrent connection limiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::{debug, info};

/// Limits the number of connections the gateway serves at once.
///
/// Admission is optimistic: [`acquire`](Self::acquire) always bumps the
/// counter and only then compares it against the limit, so a caller that
/// gets `false` back still holds a slot and must call
/// [`release`](Self::release). [`try_acquire`](Self::try_acquire) wraps that
/// contract in a guard.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    /// Maximum concurrent holders (`<= 0` = unlimited).
    limit: AtomicI64,
    /// Slots currently held, including provisional ones.
    current: AtomicI64,
}

/// Snapshot of a [`ConcurrencyLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyStatus {
    /// Configured limit.
    pub limit: i64,
    /// Slots currently held.
    pub current: i64,
}

impl ConcurrencyLimiter {
    /// Create a new limiter.
    #[must_use]
    pub const fn new(limit: i64) -> Self {
        Self {
            limit: AtomicI64::new(limit),
            current: AtomicI64::new(0),
        }
    }

    /// Take a slot and report whether the caller is within the limit.
    ///
    /// The slot is taken even when this returns `false`.
    pub fn acquire(&self) -> bool {
        let current = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        let limit = self.limit.load(Ordering::Acquire);
        let allowed = limit <= 0 || current <= limit;
        if !allowed {
            debug!(limit, current, "Concurrency limit reached");
        }
        allowed
    }

    /// Give back a slot taken by [`acquire`](Self::acquire).
    pub fn release(&self) {
        let previous = self.current.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "concurrency slot released more times than acquired");
    }

    /// Acquire a slot wrapped in a guard that releases it on drop.
    ///
    /// Returns `None` when the limit is exceeded; the provisional slot has
    /// already been returned in that case.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionPermit> {
        if self.acquire() {
            Some(ConnectionPermit {
                limiter: Arc::clone(self),
            })
        } else {
            self.release();
            None
        }
    }

    /// Replace the limit. Holders above the new limit are not evicted.
    pub fn update_limit(&self, limit: i64) {
        let previous = self.limit.swap(limit, Ordering::AcqRel);
        if previous != limit {
            info!(previous, limit, "Concurrency limit updated");
        }
    }

    /// Current limit and number of held slots.
    #[must_use]
    pub fn status(&self) -> ConcurrencyStatus {
        ConcurrencyStatus {
            limit: self.limit.load(Ordering::Acquire),
            current: self.current.load(Ordering::Acquire),
        }
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// A held concurrency slot, released when dropped.
#[derive(Debug)]
pub struct ConnectionPermit {
    limiter: Arc<ConcurrencyLimiter>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
