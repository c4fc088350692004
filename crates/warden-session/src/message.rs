//! Protocol messages carried inside frames.
//!
//! Two control kinds drive the session state machine; every other kind is
//! an application frame passed through to the handler untouched.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Kind byte of [`PubkeyMsg`].
pub const KIND_PUBKEY: u8 = 0x01;

/// Kind byte of [`PingMsg`].
pub const KIND_PING: u8 = 0x02;

/// First kind byte available to applications.
pub const FIRST_APP_KIND: u8 = 0x10;

/// Public half of an ephemeral key exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubkeyMsg {
    /// Base64-encoded X25519 public key.
    pub key: String,
}

impl PubkeyMsg {
    /// Wrap raw public key bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            key: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Decode the carried public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not base64 or not 32 bytes long.
    pub fn key_bytes(&self) -> Result<[u8; 32], FrameError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.key)
            .map_err(|e| FrameError::Payload {
                kind: "PubkeyMsg",
                reason: e.to_string(),
            })?;
        <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| FrameError::Payload {
            kind: "PubkeyMsg",
            reason: format!("key must be 32 bytes, got {}", bytes.len()),
        })
    }
}

/// Heartbeat challenge or reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMsg {
    /// Challenge nonce, or nonce + 1 in a reply.
    pub verification_key: u64,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Key exchange.
    Pubkey(PubkeyMsg),
    /// Heartbeat.
    Ping(PingMsg),
    /// Opaque application frame.
    App {
        /// Kind byte, at least [`FIRST_APP_KIND`].
        kind: u8,
        /// Payload bytes.
        payload: Vec<u8>,
    },
}

impl Message {
    /// Build an application message.
    ///
    /// # Errors
    ///
    /// Returns an error if `kind` is reserved for control messages.
    pub fn app(kind: u8, payload: impl Into<Vec<u8>>) -> Result<Self, FrameError> {
        if kind < FIRST_APP_KIND {
            return Err(FrameError::ReservedKind(kind));
        }
        Ok(Self::App {
            kind,
            payload: payload.into(),
        })
    }

    /// Kind byte on the wire.
    #[must_use]
    pub const fn kind(&self) -> u8 {
        match self {
            Self::Pubkey(_) => KIND_PUBKEY,
            Self::Ping(_) => KIND_PING,
            Self::App { kind, .. } => *kind,
        }
    }

    /// Name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pubkey(_) => "PubkeyMsg",
            Self::Ping(_) => "PingMsg",
            Self::App { .. } => "application frame",
        }
    }

    /// Serialize the payload for the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if a control payload cannot be serialized.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let encoded = match self {
            Self::Pubkey(msg) => serde_json::to_vec(msg),
            Self::Ping(msg) => serde_json::to_vec(msg),
            Self::App { payload, .. } => return Ok(payload.clone()),
        };
        encoded.map_err(|e| FrameError::Payload {
            kind: self.name(),
            reason: e.to_string(),
        })
    }

    /// Rebuild a message from its kind byte and payload.
    ///
    /// # Errors
    ///
    /// Returns an error for reserved kinds or unparseable control payloads.
    pub fn from_parts(kind: u8, payload: &[u8]) -> Result<Self, FrameError> {
        match kind {
            KIND_PUBKEY => serde_json::from_slice(payload)
                .map(Self::Pubkey)
                .map_err(|e| FrameError::Payload {
                    kind: "PubkeyMsg",
                    reason: e.to_string(),
                }),
            KIND_PING => serde_json::from_slice(payload)
                .map(Self::Ping)
                .map_err(|e| FrameError::Payload {
                    kind: "PingMsg",
                    reason: e.to_string(),
                }),
            FIRST_APP_KIND..=u8::MAX => Ok(Self::App {
                kind,
                payload: payload.to_vec(),
            }),
            reserved => Err(FrameError::ReservedKind(reserved)),
        }
    }
}
