//! # warden-admission
//!
//! Admission control protecting the gateway's downstream capacity.
//!
//! ## Limiters
//!
//! - [`ConcurrencyLimiter`] - Caps concurrently served connections
//! - [`RateLimiter`] - Token bucket capping admitted operations per second
//!
//! Both limiters use only atomic counters, so checks never block. A limit of
//! zero or below disables the limiter.
//!
//! ## Gateway Facade
//!
//! - [`AdmissionControl`] - Both limiters plus the runtime update hook
//! - [`AdmissionConfig`] - `max_connections`, `max_qps` and refill cadence
//!
//! # Example
//!
//! ```rust
//! use warden_admission::{AdmissionConfig, AdmissionControl};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), warden_admission::AdmissionError> {
//! let config = AdmissionConfig::default().with_max_connections(2);
//! let admission = AdmissionControl::new(&config)?;
//!
//! let first = admission.try_acquire_connection();
//! let second = admission.try_acquire_connection();
//! assert!(first.is_some() && second.is_some());
//! assert!(admission.try_acquire_connection().is_none());
//!
//! // A controller can raise the ceiling live
//! admission.update(3, 0);
//! assert!(admission.try_acquire_connection().is_some());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod concurrency;
pub mod config;
pub mod control;
pub mod error;
pub mod rate_limit;

// Re-export main types
pub use concurrency::{ConcurrencyLimiter, ConcurrencyStatus, ConnectionPermit};
pub use config::{AdmissionConfig, DEFAULT_REFILL_INTERVAL, per_tick_grant};
pub use control::{AdmissionControl, AdmissionStatus};
pub use error::{AdmissionError, AdmissionResult};
pub use rate_limit::{RateLimiter, RateStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_release_after_rejection_keeps_capacity() {
        let limiter = ConcurrencyLimiter::new(1);

        assert!(limiter.acquire());
        // Rejected caller must still release its provisional slot
        assert!(!limiter.acquire());
        limiter.release();

        limiter.release();
        assert!(limiter.acquire());
        assert_eq!(limiter.status().current, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_flow() {
        let admission = Arc::new(
            AdmissionControl::new(
                &AdmissionConfig::default()
                    .with_max_connections(1)
                    .with_max_qps(10),
            )
            .unwrap(),
        );

        let permit = admission.try_acquire_connection();
        assert!(permit.is_some());
        assert!(admission.try_acquire_connection().is_none());

        // Bucket starts empty and fills on the first tick
        assert!(!admission.acquire_request());
        admission.rate().refill();
        assert!(admission.acquire_request());
    }
}
