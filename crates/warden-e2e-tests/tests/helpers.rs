//! Test helpers for E2E tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use warden_gateway::{EchoHandler, Gateway, GatewayConfig, ServerResult};
use warden_session::frame::{self, Decoded};
use warden_session::{ClientHandshake, ConnectionId, Message, MessageHandler, SessionKeys};

/// Default test timeout.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway configuration for tests: loopback, ephemeral port, and no
/// heartbeats unless a test asks for them.
pub fn test_config() -> GatewayConfig {
    GatewayConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
        .with_heartbeat_interval(Duration::from_secs(3600))
        .with_shutdown_grace(Duration::from_secs(2))
}

/// Poll `condition` until it holds or [`TEST_TIMEOUT`] passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Test gateway that manages its own lifecycle.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    handle: Option<JoinHandle<ServerResult<()>>>,
}

impl TestGateway {
    /// Start an echoing gateway with [`test_config`].
    pub async fn start() -> Self {
        Self::start_with(test_config()).await
    }

    /// Start an echoing gateway with a custom configuration.
    pub async fn start_with(config: GatewayConfig) -> Self {
        Self::start_with_handler(config, Arc::new(EchoHandler)).await
    }

    /// Start a gateway with a custom handler.
    pub async fn start_with_handler(config: GatewayConfig, handler: Arc<dyn MessageHandler>) -> Self {
        let gateway = Arc::new(Gateway::new(config, handler).unwrap());
        let listener = gateway.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(Arc::clone(&gateway).serve(listener));

        Self {
            addr,
            gateway,
            handle: Some(handle),
        }
    }

    /// Number of registered sessions.
    pub fn live_count(&self) -> usize {
        self.gateway.live_count()
    }

    /// Wait until exactly `n` sessions are registered.
    pub async fn wait_for_live(&self, n: usize) -> bool {
        eventually(|| self.live_count() == n).await
    }

    /// Ids of registered sessions, oldest first.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids = self.gateway.engine().registry().ids();
        ids.sort();
        ids
    }

    /// The id of the single registered session.
    pub fn only_connection(&self) -> ConnectionId {
        let ids = self.connection_ids();
        assert_eq!(ids.len(), 1, "expected exactly one live connection");
        ids[0]
    }

    /// Shut the gateway down and wait for `serve` to return.
    pub async fn shutdown(mut self) -> ServerResult<()> {
        self.gateway.shutdown();
        match self.handle.take() {
            Some(handle) => timeout(TEST_TIMEOUT, handle)
                .await
                .expect("gateway did not stop in time")
                .expect("gateway task panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.gateway.shutdown();
    }
}

/// Raw protocol client speaking the warden framing over TCP.
pub struct TestClient {
    stream: TcpStream,
    buffer: Vec<u8>,
    keys: Option<SessionKeys>,
}

impl TestClient {
    /// Open a TCP connection without handshaking.
    pub async fn connect(addr: SocketAddr) -> Result<Self, String> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| format!("Failed to connect: {e}"))?;
        stream.set_nodelay(true).map_err(|e| e.to_string())?;
        Ok(Self {
            stream,
            buffer: Vec::new(),
            keys: None,
        })
    }

    /// Connect and complete the key exchange.
    pub async fn connect_keyed(addr: SocketAddr) -> Result<Self, String> {
        let mut client = Self::connect(addr).await?;
        client.handshake().await?;
        Ok(client)
    }

    /// Run the client half of the key exchange.
    pub async fn handshake(&mut self) -> Result<(), String> {
        let handshake = ClientHandshake::new();
        self.send(&Message::Pubkey(handshake.pubkey_msg())).await?;

        match self.recv().await? {
            Message::Pubkey(server) => {
                let keys = handshake.finish(&server).map_err(|e| e.to_string())?;
                self.keys = Some(keys);
                Ok(())
            }
            other => Err(format!("Expected PubkeyMsg, got {other:?}")),
        }
    }

    /// Whether a session key is established.
    pub fn is_keyed(&self) -> bool {
        self.keys.is_some()
    }

    /// Encode a message as one frame, sealed once keyed.
    ///
    /// Sealed frames must be sent in the order they were encoded.
    pub fn encode(&mut self, message: &Message) -> Vec<u8> {
        let sender = self.keys.as_mut().map(|keys| &mut keys.send);
        frame::encode(message, sender).unwrap()
    }

    /// Send one message.
    pub async fn send(&mut self, message: &Message) -> Result<(), String> {
        let frame = self.encode(message);
        self.send_raw(&frame).await
    }

    /// Send arbitrary bytes.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), String> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| e.to_string())
    }

    /// Receive the next message.
    pub async fn recv(&mut self) -> Result<Message, String> {
        self.recv_within(TEST_TIMEOUT).await
    }

    /// Receive the next message, giving up after `limit`.
    pub async fn recv_within(&mut self, limit: Duration) -> Result<Message, String> {
        loop {
            let receiver = self.keys.as_mut().map(|keys| &mut keys.recv);
            match frame::decode(&self.buffer, receiver, usize::MAX) {
                Ok(Decoded::Complete { message, consumed }) => {
                    self.buffer.drain(..consumed);
                    return Ok(message);
                }
                Ok(Decoded::Incomplete) => {}
                Err(e) => return Err(format!("Bad frame from gateway: {e}")),
            }

            let mut chunk = [0u8; 4096];
            let read = timeout(limit, self.stream.read(&mut chunk))
                .await
                .map_err(|_| "Timeout waiting for message".to_string())?
                .map_err(|e| e.to_string())?;
            if read == 0 {
                return Err("Connection closed".into());
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Wait for the gateway to close the connection.
    ///
    /// Returns `false` if it is still open after [`TEST_TIMEOUT`].
    pub async fn wait_closed(&mut self) -> bool {
        let mut chunk = [0u8; 4096];
        loop {
            match timeout(TEST_TIMEOUT, self.stream.read(&mut chunk)).await {
                Err(_) => return false,
                Ok(Ok(0) | Err(_)) => return true,
                Ok(Ok(_)) => {}
            }
        }
    }
}
