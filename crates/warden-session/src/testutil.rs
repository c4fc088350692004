//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::handler::Transport;

/// Transport that records what the engine sends.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl RecordingTransport {
    /// Drain every frame sent so far.
    pub(crate) fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Whether a close was requested.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn send(&self, bytes: Vec<u8>) {
        self.sent.lock().push(bytes);
    }

    fn request_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
