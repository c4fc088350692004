//! Gateway configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_admission::AdmissionConfig;
use warden_session::SessionConfig;

use crate::error::{ServerError, ServerResult};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:7400";

/// Default socket read buffer: 16KB.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Default number of frames queued for one connection's writer.
pub const DEFAULT_OUTBOUND_QUEUE_SIZE: usize = 256;

/// Configuration for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address to accept connections on.
    pub bind_addr: SocketAddr,
    /// Connection and request limits.
    pub admission: AdmissionConfig,
    /// Frame and heartbeat limits.
    pub session: SessionConfig,
    /// How often authenticated connections are challenged.
    pub heartbeat_interval: Duration,
    /// How long a connection may stay unkeyed.
    pub handshake_timeout: Duration,
    /// Bytes read from a socket per call.
    pub read_buffer_size: usize,
    /// Frames queued per connection before a slow peer is closed.
    pub outbound_queue_size: usize,
    /// How long shutdown waits for connections to finish.
    pub shutdown_grace: Duration,
}

impl GatewayConfig {
    /// Create a configuration with defaults for the given address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            admission: AdmissionConfig::default(),
            session: SessionConfig::default(),
            heartbeat_interval: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE_SIZE,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    /// Set admission limits.
    #[must_use]
    pub fn with_admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }

    /// Set session limits.
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the socket read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set how many frames may wait for one connection's writer.
    #[must_use]
    pub const fn with_outbound_queue_size(mut self, size: usize) -> Self {
        self.outbound_queue_size = size;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any interval or buffer size is zero, or a nested
    /// configuration is invalid.
    pub fn validate(&self) -> ServerResult<()> {
        self.admission.validate()?;
        self.session.validate()?;
        if self.heartbeat_interval.is_zero() {
            return Err(ServerError::Config(
                "heartbeat_interval must be greater than 0".into(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ServerError::Config(
                "handshake_timeout must be greater than 0".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ServerError::Config(
                "read_buffer_size must be greater than 0".into(),
            ));
        }
        if self.outbound_queue_size == 0 {
            return Err(ServerError::Config(
                "outbound_queue_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 7400)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.read_buffer_size, 16 * 1024);
        assert_eq!(config.outbound_queue_size, DEFAULT_OUTBOUND_QUEUE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = GatewayConfig::default()
            .with_admission(AdmissionConfig::unlimited().with_max_connections(5))
            .with_session(SessionConfig::default().with_heartbeat_miss_limit(3))
            .with_heartbeat_interval(Duration::from_secs(1))
            .with_handshake_timeout(Duration::from_millis(500))
            .with_read_buffer_size(1024)
            .with_outbound_queue_size(8)
            .with_shutdown_grace(Duration::from_secs(1));

        assert_eq!(config.admission.max_connections, 5);
        assert_eq!(config.session.heartbeat_miss_limit, 3);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.handshake_timeout, Duration::from_millis(500));
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.outbound_queue_size, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_heartbeat_invalid() {
        let config = GatewayConfig::default().with_heartbeat_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_zero_read_buffer_invalid() {
        let config = GatewayConfig::default().with_read_buffer_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_outbound_queue_invalid() {
        let config = GatewayConfig::default().with_outbound_queue_size(0);
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_nested_config_checked() {
        let config = GatewayConfig::default()
            .with_admission(AdmissionConfig::unlimited().with_refill_interval(Duration::ZERO));
        assert!(matches!(config.validate(), Err(ServerError::Admission(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = GatewayConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.bind_addr, config.bind_addr);
        assert_eq!(parsed.session, config.session);
    }
}
