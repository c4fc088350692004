//! Session engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::frame::LENGTH_PREFIX_SIZE;

/// Default maximum frame body size (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Default bound on undecoded inbound bytes (4 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Limits applied to every session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Largest accepted frame body, in bytes.
    pub max_frame_size: usize,
    /// Largest amount of undecoded data held per connection.
    pub max_buffer_size: usize,
    /// Unanswered heartbeats tolerated before closing. 0 never closes.
    pub heartbeat_miss_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            heartbeat_miss_limit: 1,
        }
    }
}

impl SessionConfig {
    /// Set the maximum frame body size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the inbound buffer bound.
    #[must_use]
    pub const fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Set how many unanswered heartbeats close the connection.
    #[must_use]
    pub const fn with_heartbeat_miss_limit(mut self, limit: u32) -> Self {
        self.heartbeat_miss_limit = limit;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame size is zero or the buffer cannot hold
    /// one maximum-sized frame.
    pub fn validate(&self) -> SessionResult<()> {
        if self.max_frame_size == 0 {
            return Err(SessionError::Config(
                "max_frame_size must be greater than 0".into(),
            ));
        }
        if u32::try_from(self.max_frame_size).is_err() {
            return Err(SessionError::Config(format!(
                "max_frame_size {} does not fit the length prefix",
                self.max_frame_size
            )));
        }
        let needed = self.max_frame_size + LENGTH_PREFIX_SIZE;
        if self.max_buffer_size < needed {
            return Err(SessionError::Config(format!(
                "max_buffer_size {} cannot hold a {needed} byte frame",
                self.max_buffer_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.max_frame_size, 1024 * 1024);
        assert_eq!(config.max_buffer_size, 4 * 1024 * 1024);
        assert_eq!(config.heartbeat_miss_limit, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::default()
            .with_max_frame_size(64)
            .with_max_buffer_size(128)
            .with_heartbeat_miss_limit(3);
        assert_eq!(config.max_frame_size, 64);
        assert_eq!(config.max_buffer_size, 128);
        assert_eq!(config.heartbeat_miss_limit, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_frame_size_invalid() {
        let config = SessionConfig::default().with_max_frame_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_must_hold_one_frame() {
        let config = SessionConfig::default()
            .with_max_frame_size(64)
            .with_max_buffer_size(67);
        assert!(config.validate().is_err());

        let config = config.with_max_buffer_size(68);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = SessionConfig::default().with_heartbeat_miss_limit(0);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
