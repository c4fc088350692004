//! Command-line argument parsing with clap.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use warden_admission::AdmissionConfig;

use crate::config::{DEFAULT_BIND_ADDR, DEFAULT_OUTBOUND_QUEUE_SIZE, GatewayConfig};

/// Warden - authenticated TCP session gateway.
#[derive(Parser, Debug, Clone)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address to accept connections on.
    #[arg(long, env = "WARDEN_BIND", default_value = DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,

    /// Maximum concurrent connections (0 or less = unlimited).
    #[arg(long, env = "WARDEN_MAX_CONNECTIONS", default_value_t = 0, allow_negative_numbers = true)]
    pub max_connections: i64,

    /// Maximum application frames per second (0 or less = unlimited).
    #[arg(long, env = "WARDEN_MAX_QPS", default_value_t = 0, allow_negative_numbers = true)]
    pub max_qps: i64,

    /// Rate limiter refill interval in milliseconds.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub refill_interval_ms: u64,

    /// Seconds between heartbeat challenges.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub heartbeat_interval_secs: u64,

    /// Seconds a connection may take to complete the key exchange.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub handshake_timeout_secs: u64,

    /// Frames queued per connection before a slow reader is disconnected.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_QUEUE_SIZE as u64, value_parser = clap::value_parser!(u64).range(1..))]
    pub outbound_queue_size: u64,
}

impl Cli {
    /// Build the gateway configuration these arguments describe.
    #[must_use]
    pub fn to_config(&self) -> GatewayConfig {
        let admission = AdmissionConfig::unlimited()
            .with_max_connections(self.max_connections)
            .with_max_qps(self.max_qps)
            .with_refill_interval(Duration::from_millis(self.refill_interval_ms));

        GatewayConfig::new(self.bind)
            .with_admission(admission)
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_interval_secs))
            .with_handshake_timeout(Duration::from_secs(self.handshake_timeout_secs))
            .with_outbound_queue_size(usize::try_from(self.outbound_queue_size).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["warden"]).unwrap();
        let config = cli.to_config();

        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:7400");
        assert_eq!(config.admission, AdmissionConfig::unlimited());
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.outbound_queue_size, DEFAULT_OUTBOUND_QUEUE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_limits_and_intervals() {
        let cli = Cli::try_parse_from([
            "warden",
            "--bind",
            "127.0.0.1:9000",
            "--max-connections",
            "250",
            "--max-qps",
            "1000",
            "--refill-interval-ms",
            "50",
            "--heartbeat-interval-secs",
            "5",
            "--handshake-timeout-secs",
            "2",
            "--outbound-queue-size",
            "64",
        ])
        .unwrap();
        let config = cli.to_config();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.admission.max_connections, 250);
        assert_eq!(config.admission.max_qps, 1000);
        assert_eq!(config.admission.refill_interval, Duration::from_millis(50));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.handshake_timeout, Duration::from_secs(2));
        assert_eq!(config.outbound_queue_size, 64);
    }

    #[test]
    fn test_negative_limit_accepted() {
        let cli = Cli::try_parse_from(["warden", "--max-qps", "-1"]).unwrap();
        assert_eq!(cli.max_qps, -1);
    }

    #[test_case("--refill-interval-ms" ; "refill")]
    #[test_case("--heartbeat-interval-secs" ; "heartbeat")]
    #[test_case("--handshake-timeout-secs" ; "handshake")]
    #[test_case("--outbound-queue-size" ; "outbound queue")]
    fn test_zero_interval_rejected(flag: &str) {
        assert!(Cli::try_parse_from(["warden", flag, "0"]).is_err());
    }

    #[test]
    fn test_invalid_bind_rejected() {
        assert!(Cli::try_parse_from(["warden", "--bind", "not-an-addr"]).is_err());
    }
}
