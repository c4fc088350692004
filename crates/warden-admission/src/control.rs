//! Gateway-scoped admission control combining both limiters.

use std::sync::Arc;

use tracing::info;

use crate::concurrency::{ConcurrencyLimiter, ConcurrencyStatus, ConnectionPermit};
use crate::config::AdmissionConfig;
use crate::error::AdmissionResult;
use crate::rate_limit::{RateLimiter, RateStatus};

/// Snapshot of both limiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionStatus {
    /// Concurrent connection limiter state.
    pub connections: ConcurrencyStatus,
    /// Request rate limiter state.
    pub rate: RateStatus,
}

/// Admission gate owned by the gateway for its whole life.
///
/// Created once at startup from an [`AdmissionConfig`] and updated in place
/// through [`update`](Self::update); never recreated.
#[derive(Debug)]
pub struct AdmissionControl {
    connections: Arc<ConcurrencyLimiter>,
    rate: RateLimiter,
}

impl AdmissionControl {
    /// Create both limiters from configuration.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &AdmissionConfig) -> AdmissionResult<Self> {
        config.validate()?;
        info!(
            max_connections = config.max_connections,
            max_qps = config.max_qps,
            refill_interval_ms = config.refill_interval.as_millis() as u64,
            "Admission control initialized"
        );
        Ok(Self {
            connections: Arc::new(ConcurrencyLimiter::new(config.max_connections)),
            rate: RateLimiter::from_config(config)?,
        })
    }

    /// Try to admit a new connection.
    ///
    /// The returned permit holds the slot until dropped.
    #[must_use]
    pub fn try_acquire_connection(&self) -> Option<ConnectionPermit> {
        self.connections.try_acquire()
    }

    /// Try to admit one unit of work.
    pub fn acquire_request(&self) -> bool {
        self.rate.acquire()
    }

    /// Replace both limits live. Values `<= 0` disable a limiter.
    pub fn update(&self, max_connections: i64, max_qps: i64) {
        self.connections.update_limit(max_connections);
        self.rate.update_limit(max_qps);
    }

    /// Apply a full configuration, including a new refill interval.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn apply(&self, config: &AdmissionConfig) -> AdmissionResult<()> {
        config.validate()?;
        self.connections.update_limit(config.max_connections);
        self.rate
            .update_qps_limit(config.refill_interval, config.max_qps)
    }

    /// Current state of both limiters.
    #[must_use]
    pub fn status(&self) -> AdmissionStatus {
        AdmissionStatus {
            connections: self.connections.status(),
            rate: self.rate.status(),
        }
    }

    /// The concurrent connection limiter.
    #[must_use]
    pub fn connections(&self) -> &Arc<ConcurrencyLimiter> {
        &self.connections
    }

    /// The request rate limiter.
    #[must_use]
    pub const fn rate(&self) -> &RateLimiter {
        &self.rate
    }
}
