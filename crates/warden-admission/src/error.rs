//! Error types for admission control.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while configuring admission control.
///
/// Rejections by a limiter are not errors: `acquire` reports them as `false`
/// so that overload stays on the cheap, expected path.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The refill interval must be non-zero.
    #[error("invalid refill interval: {0:?}")]
    InvalidRefillInterval(Duration),
}

/// Result type for admission operations.
pub type AdmissionResult<T> = Result<T, AdmissionError>;
