//! Gateway-wide request rate limiting using a token bucket.
//!
//! The bucket is normalized against a one-second reference window: a limit of
//! `N` permits per second refilled every `interval` grants
//! `floor(N * interval / 1s)` permits per tick. Replenishment runs on a Tokio
//! task that is restarted whenever the interval changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{AdmissionConfig, per_tick_grant};
use crate::error::{AdmissionError, AdmissionResult};

/// Token bucket state shared with the refill task.
#[derive(Debug)]
struct Bucket {
    /// Permits per second (`<= 0` = unlimited).
    limit: AtomicI64,
    /// Permits currently available. May dip below zero under contention.
    tokens: AtomicI64,
    /// Permits granted per refill tick.
    per_tick: AtomicI64,
}

impl Bucket {
    fn new(limit: i64, interval: Duration) -> Self {
        Self {
            limit: AtomicI64::new(limit),
            tokens: AtomicI64::new(0),
            per_tick: AtomicI64::new(per_tick_grant(limit, interval)),
        }
    }

    /// Add one tick's worth of permits.
    fn refill(&self) {
        let limit = self.limit.load(Ordering::Acquire);
        let tokens = self.tokens.load(Ordering::Acquire);
        if limit < tokens {
            return;
        }

        let per_tick = self.per_tick.load(Ordering::Acquire);
        let mut delta = limit.saturating_sub(tokens);
        if delta < 0 || delta > per_tick {
            delta = per_tick;
        }

        let previous = self
            .tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                Some(t.saturating_add(delta))
            })
            .unwrap_or_else(|t| t);
        let refilled = previous.saturating_add(delta);
        if refilled < per_tick {
            // Racing consumers drove the bucket negative; grant at least one tick.
            self.tokens.fetch_max(per_tick, Ordering::AcqRel);
        }
    }

    fn acquire(&self) -> bool {
        if self.limit.load(Ordering::Acquire) <= 0 {
            return true;
        }
        if self.tokens.load(Ordering::Acquire) <= 0 {
            return false;
        }
        self.tokens.fetch_sub(1, Ordering::AcqRel) > 0
    }
}

/// Handle to a running refill task.
#[derive(Debug)]
struct Ticker {
    interval: Duration,
    stop: mpsc::Sender<()>,
}

impl Ticker {
    fn spawn(bucket: Arc<Bucket>, interval: Duration) -> Self {
        let (stop, mut stop_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticks.tick() => bucket.refill(),
                    _ = stop_rx.recv() => break,
                }
            }
            debug!(interval_ms = interval.as_millis() as u64, "Refill task stopped");
        });

        Self { interval, stop }
    }

    /// Signal the refill task to exit. Dropped if a stop is already queued.
    fn stop(&self) {
        let _ = self.stop.try_send(());
    }
}

/// Snapshot of a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    /// Permits per second.
    pub limit: i64,
    /// Permits currently in the bucket.
    pub tokens: i64,
    /// Refill cadence.
    pub refill_interval: Duration,
}

/// Token-bucket rate limiter replenished on a fixed cadence.
///
/// Must be created inside a Tokio runtime: construction spawns the refill task.
/// Dropping the limiter stops the task.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Arc<Bucket>,
    ticker: Mutex<Ticker>,
}

impl RateLimiter {
    /// Create a limiter granting `limit` permits per second, refilled every `interval`.
    ///
    /// The bucket starts empty and fills on the first tick.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionError::InvalidRefillInterval` if `interval` is zero.
    pub fn new(limit: i64, interval: Duration) -> AdmissionResult<Self> {
        if interval.is_zero() {
            return Err(AdmissionError::InvalidRefillInterval(interval));
        }
        warn_if_starved(limit, interval);

        let bucket = Arc::new(Bucket::new(limit, interval));
        let ticker = Ticker::spawn(Arc::clone(&bucket), interval);

        Ok(Self {
            bucket,
            ticker: Mutex::new(ticker),
        })
    }

    /// Create from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured interval is invalid.
    pub fn from_config(config: &AdmissionConfig) -> AdmissionResult<Self> {
        Self::new(config.max_qps, config.refill_interval)
    }

    /// Take one permit if available.
    ///
    /// Always succeeds when the limit is unlimited.
    pub fn acquire(&self) -> bool {
        self.bucket.acquire()
    }

    /// Run one refill tick immediately.
    ///
    /// The background task calls this on every interval.
    pub fn refill(&self) {
        self.bucket.refill();
    }

    /// Replace the per-second limit, keeping the current interval.
    pub fn update_limit(&self, limit: i64) {
        let interval = self.ticker.lock().interval;
        // The current interval is known non-zero.
        let _ = self.update_qps_limit(interval, limit);
    }

    /// Replace both the refill interval and the per-second limit.
    ///
    /// A bucket holding more than one tick's worth is shrunk so the new
    /// configuration cannot be hit by a burst sized for the old one.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionError::InvalidRefillInterval` if `interval` is zero.
    pub fn update_qps_limit(&self, interval: Duration, limit: i64) -> AdmissionResult<()> {
        if interval.is_zero() {
            return Err(AdmissionError::InvalidRefillInterval(interval));
        }
        warn_if_starved(limit, interval);

        let grant = per_tick_grant(limit, interval);
        self.bucket.limit.store(limit, Ordering::Release);
        self.bucket.per_tick.store(grant, Ordering::Release);
        self.bucket.tokens.fetch_min(grant, Ordering::AcqRel);

        let mut ticker = self.ticker.lock();
        if ticker.interval != interval {
            ticker.stop();
            *ticker = Ticker::spawn(Arc::clone(&self.bucket), interval);
        }
        drop(ticker);

        info!(
            limit,
            per_tick = grant,
            interval_ms = interval.as_millis() as u64,
            "Rate limit updated"
        );
        Ok(())
    }

    /// Current limit, bucket level and refill interval.
    #[must_use]
    pub fn status(&self) -> RateStatus {
        RateStatus {
            limit: self.bucket.limit.load(Ordering::Acquire),
            tokens: self.bucket.tokens.load(Ordering::Acquire),
            refill_interval: self.ticker.lock().interval,
        }
    }

    /// Permits granted per refill tick.
    #[must_use]
    pub fn per_tick(&self) -> i64 {
        self.bucket.per_tick.load(Ordering::Acquire)
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.ticker.lock().stop();
    }
}

fn warn_if_starved(limit: i64, interval: Duration) {
    if limit > 0 && per_tick_grant(limit, interval) == 0 {
        warn!(
            limit,
            interval_ms = interval.as_millis() as u64,
            "Rate limit grants zero permits per tick; all requests will be rejected"
        );
    }
}
