//! Error types for the gateway.

use std::net::SocketAddr;

use thiserror::Error;
use warden_admission::AdmissionError;
use warden_session::SessionError;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Admission control could not be configured.
    #[error("admission error: {0}")]
    Admission(#[from] AdmissionError),

    /// Session engine could not be configured.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Invalid gateway configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for gateway operations.
pub type ServerResult<T> = Result<T, ServerError>;
