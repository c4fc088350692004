//! Ephemeral key exchange and frame sealing.
//!
//! Both sides generate an X25519 key pair per connection, exchange public
//! keys in [`PubkeyMsg`] frames, and derive one key per direction from the
//! shared secret with BLAKE3. Frames are then sealed with ChaCha20-Poly1305
//! as `nonce || ciphertext || tag`, where the nonce carries a per-direction
//! frame counter. A receiver accepts only the next counter, so a frame can
//! be neither replayed nor reflected back at its sender.

use std::fmt;

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand_core::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{FrameError, SessionError, SessionResult};
use crate::message::PubkeyMsg;

/// Size of the session key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the per-frame nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const CLIENT_TO_SERVER_CONTEXT: &str = "warden session v1 client to server";
const SERVER_TO_CLIENT_CONTEXT: &str = "warden session v1 server to client";

/// Which end of the connection a key set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The connecting peer.
    Client,
    /// The gateway.
    Server,
}

/// Symmetric key for one direction of a session.
///
/// Zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; KEY_SIZE],
}

impl SessionKey {
    /// Derive a direction key from an ECDH shared secret.
    #[must_use]
    pub fn derive(context: &str, shared: &[u8; KEY_SIZE]) -> Self {
        Self {
            bytes: blake3::derive_key(context, shared),
        }
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(&self.bytes.into())
    }

    /// Encrypt `plaintext` under the nonce for frame `counter`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn seal(&self, counter: u64, plaintext: &[u8]) -> Result<Vec<u8>, FrameError> {
        let nonce_bytes = counter_nonce(counter);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| FrameError::Encryption(e.to_string()))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Decrypt and authenticate a sealed body, returning its frame counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is too short or fails authentication.
    pub fn open(&self, sealed: &[u8]) -> Result<(u64, Vec<u8>), FrameError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(FrameError::Truncated(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| FrameError::Authentication)?;

        let mut counter = [0u8; 8];
        counter.copy_from_slice(&nonce[NONCE_SIZE - 8..]);
        Ok((u64::from_be_bytes(counter), plaintext))
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// `0u32 || counter` big endian.
fn counter_nonce(counter: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[NONCE_SIZE - 8..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Outbound half: seals frames with consecutive counters.
#[derive(Debug)]
pub struct SendKey {
    key: SessionKey,
    next: u64,
}

impl SendKey {
    /// Seal the next frame.
    ///
    /// # Errors
    ///
    /// Returns an error once the counter space is spent or if encryption
    /// fails.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, FrameError> {
        let following = self
            .next
            .checked_add(1)
            .ok_or_else(|| FrameError::Encryption("frame counter exhausted".into()))?;
        let sealed = self.key.seal(self.next, plaintext)?;
        self.next = following;
        Ok(sealed)
    }

    /// Counter the next frame will carry.
    #[must_use]
    pub const fn next_counter(&self) -> u64 {
        self.next
    }
}

/// Inbound half: opens frames and insists on the next counter.
#[derive(Debug)]
pub struct RecvKey {
    key: SessionKey,
    next: u64,
}

impl RecvKey {
    /// Open the next frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the body fails authentication or carries any
    /// counter but the expected one.
    pub fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, FrameError> {
        let (counter, plaintext) = self.key.open(sealed)?;
        if counter != self.next {
            return Err(FrameError::Replay {
                expected: self.next,
                received: counter,
            });
        }
        self.next = self.next.saturating_add(1);
        Ok(plaintext)
    }

    /// Counter the next frame must carry.
    #[must_use]
    pub const fn next_counter(&self) -> u64 {
        self.next
    }
}

/// Both directions of an established session, oriented for one side.
#[derive(Debug)]
pub struct SessionKeys {
    /// Seals frames this side sends.
    pub send: SendKey,
    /// Opens frames this side receives.
    pub recv: RecvKey,
}

impl SessionKeys {
    /// Derive the key pair for `side` from an ECDH shared secret.
    #[must_use]
    pub fn derive(shared: &[u8; KEY_SIZE], side: Side) -> Self {
        let outbound = SessionKey::derive(CLIENT_TO_SERVER_CONTEXT, shared);
        let inbound = SessionKey::derive(SERVER_TO_CLIENT_CONTEXT, shared);
        let (send, recv) = match side {
            Side::Client => (outbound, inbound),
            Side::Server => (inbound, outbound),
        };
        Self {
            send: SendKey { key: send, next: 0 },
            recv: RecvKey { key: recv, next: 0 },
        }
    }
}

fn agree(secret: EphemeralSecret, peer: &PubkeyMsg, side: Side) -> SessionResult<SessionKeys> {
    let peer = PublicKey::from(peer.key_bytes()?);
    let shared = secret.diffie_hellman(&peer);
    if !shared.was_contributory() {
        return Err(SessionError::KeyExchange(
            "peer public key is low order".into(),
        ));
    }
    Ok(SessionKeys::derive(shared.as_bytes(), side))
}

/// Server side of the handshake: answer a peer's public key.
///
/// Returns the server's own [`PubkeyMsg`] and its session keys.
///
/// # Errors
///
/// Returns an error if the peer key cannot be decoded or is non-contributory.
pub fn respond(peer: &PubkeyMsg) -> SessionResult<(PubkeyMsg, SessionKeys)> {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let keys = agree(secret, peer, Side::Server)?;
    Ok((PubkeyMsg::from_bytes(public.as_bytes()), keys))
}

/// Client side of the handshake.
pub struct ClientHandshake {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl ClientHandshake {
    /// Generate a fresh ephemeral key pair.
    #[must_use]
    pub fn new() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The message announcing this side's public key.
    #[must_use]
    pub fn pubkey_msg(&self) -> PubkeyMsg {
        PubkeyMsg::from_bytes(self.public.as_bytes())
    }

    /// Complete the exchange with the server's reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the server key cannot be decoded or is
    /// non-contributory.
    pub fn finish(self, server: &PubkeyMsg) -> SessionResult<SessionKeys> {
        agree(self.secret, server, Side::Client)
    }
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandshake")
            .field("public", &self.pubkey_msg().key)
            .finish_non_exhaustive()
    }
}
