//! Admission control configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, AdmissionResult};

/// Default cadence at which the rate limiter's bucket is replenished.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_millis(100);

/// Limits applied by the gateway before and while serving connections.
///
/// A limit of zero or below disables the corresponding limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum concurrent connections (`<= 0` = unlimited).
    pub max_connections: i64,
    /// Maximum admitted operations per second (`<= 0` = unlimited).
    pub max_qps: i64,
    /// How often the token bucket is topped up.
    pub refill_interval: Duration,
}

impl AdmissionConfig {
    /// Create a configuration with both limits disabled.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_connections: 0,
            max_qps: 0,
            refill_interval: DEFAULT_REFILL_INTERVAL,
        }
    }

    /// Set the maximum number of concurrent connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: i64) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the maximum operations per second.
    #[must_use]
    pub const fn with_max_qps(mut self, max: i64) -> Self {
        self.max_qps = max;
        self
    }

    /// Set the bucket refill interval.
    #[must_use]
    pub const fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }

    /// Check that the configuration can drive the limiters.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionError::InvalidRefillInterval` if the interval is zero.
    pub fn validate(&self) -> AdmissionResult<()> {
        if self.refill_interval.is_zero() {
            return Err(AdmissionError::InvalidRefillInterval(self.refill_interval));
        }
        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Number of permits granted per refill tick for `limit` permits per second.
///
/// Computed as `floor(limit * interval / 1s)`, never negative.
#[must_use]
pub fn per_tick_grant(limit: i64, interval: Duration) -> i64 {
    if limit <= 0 {
        return 0;
    }
    let grant = i128::from(limit) * interval.as_nanos() as i128 / 1_000_000_000;
    i64::try_from(grant).unwrap_or(i64::MAX).max(0)
}
