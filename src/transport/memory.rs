use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{TransportError, TransportResult};
use crate::transport::{MessageHandler, Transport, TransportStats};

/// In-memory transport that records outbound frames and lets the caller
/// push inbound frames by hand.
pub struct MemoryTransport {
    name: String,
    sent: Mutex<Vec<String>>,
    handler: Mutex<Option<MessageHandler>>,
    connected: AtomicBool,
    stats: Mutex<TransportStats>,
}

impl MemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            connected: AtomicBool::new(true),
            stats: Mutex::new(TransportStats::default()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Frames sent so far, oldest first
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Drain the recorded frames
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Hand one inbound frame to the installed handler.
    ///
    /// Returns `false` when no handler is installed and the frame was dropped.
    pub fn deliver(&self, text: &str) -> bool {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                {
                    let mut stats = self.stats.lock();
                    stats.messages_received += 1;
                    stats.bytes_received += text.len() as u64;
                }
                handler(text);
                true
            }
            None => {
                self.stats.lock().recv_errors += 1;
                false
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn send(&self, text: &str) -> TransportResult<()> {
        if !self.connected.load(Ordering::Acquire) {
            self.stats.lock().send_errors += 1;
            return Err(TransportError::Disconnected);
        }

        self.sent.lock().push(text.to_string());

        let mut stats = self.stats.lock();
        stats.messages_sent += 1;
        stats.bytes_sent += text.len() as u64;
        Ok(())
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("name", &self.name)
            .field("sent", &self.sent.lock().len())
            .finish()
    }
}
