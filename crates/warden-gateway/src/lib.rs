//! # warden-gateway
//!
//! TCP gateway that admits untrusted clients, runs the warden session
//! protocol on each connection, and keeps load within configured limits.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! accept ──► concurrency permit? ──no──► drop socket
//!                  │ yes
//!                  ▼
//!           SessionEngine::accept
//!                  │
//!        ┌─────────┴──────────┐
//!        │  one task, ordered │◄── socket reads   ─► receive
//!        │                    │◄── heartbeat tick ─► heartbeat
//!        │                    │◄── close request
//!        └─────────┬──────────┘
//!                  ▼
//!           SessionEngine::closed ──► permit released
//! ```
//!
//! Application frames pass through the request rate limiter before reaching
//! the configured handler; frames over the limit are dropped.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use warden_gateway::{EchoHandler, Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), warden_gateway::ServerError> {
//!     let config = GatewayConfig::new(SocketAddr::from(([0, 0, 0, 0], 7400)));
//!     let gateway = Arc::new(Gateway::new(config, Arc::new(EchoHandler))?);
//!     gateway.run().await
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod transport;

// Re-export main types
pub use cli::Cli;
pub use config::{
    DEFAULT_BIND_ADDR, DEFAULT_OUTBOUND_QUEUE_SIZE, DEFAULT_READ_BUFFER_SIZE, GatewayConfig,
};
pub use error::{ServerError, ServerResult};
pub use handler::{EchoHandler, RateLimitedHandler};
pub use server::{Gateway, GatewayStatus};
pub use transport::{OutboundReceiver, TcpTransport, run_writer};
