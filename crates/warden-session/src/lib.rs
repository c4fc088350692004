//! # warden-session
//!
//! Per-connection protocol engine for the warden gateway.
//!
//! Every connection moves through `Unkeyed -> Keyed -> Authenticated`:
//!
//! 1. The client sends a [`PubkeyMsg`] in the clear. The server answers with
//!    its own ephemeral key and both sides derive [`SessionKeys`], one key
//!    per direction.
//! 2. From then on every frame is sealed with ChaCha20-Poly1305 under a
//!    per-direction counter; replayed or reflected frames close the
//!    connection.
//! 3. Once an external authority calls [`SessionEngine::authenticate`], the
//!    server challenges the peer with [`PingMsg`] heartbeats; the reply must
//!    carry the nonce plus one.
//!
//! Received bytes are buffered per connection and decoded as length-delimited
//! frames. A partial frame waits for more data; a malformed one, a failed
//! MAC or any other protocol violation closes that connection alone.
//!
//! ## Modules
//!
//! - [`engine`] - [`SessionEngine`], the substrate-facing callbacks
//! - [`session`] - Per-connection state owned by the registry
//! - [`frame`] - Frame codec and inbound buffer
//! - [`crypto`] - X25519 key exchange and frame sealing
//! - [`message`] - Control and application messages
//! - [`handler`] - [`Transport`] and [`MessageHandler`] seams

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod frame;
pub mod handler;
pub mod message;
pub mod session;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export main types
pub use config::SessionConfig;
pub use crypto::{ClientHandshake, RecvKey, SendKey, SessionKey, SessionKeys, Side};
pub use engine::SessionEngine;
pub use error::{FrameError, SessionError, SessionResult};
pub use frame::{Decoded, FrameBuffer};
pub use handler::{DiscardHandler, MessageHandler, SessionContext, Transport};
pub use message::{FIRST_APP_KIND, Message, PingMsg, PubkeyMsg};
pub use session::Session;
pub use types::{ConnectionId, RoleId, RoleState};
