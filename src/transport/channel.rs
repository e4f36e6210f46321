use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{TransportError, TransportResult};
use crate::transport::{MessageHandler, Transport, TransportStats, spawn_weak_loop};

pub const DEFAULT_CAPACITY: usize = 256;

/// Configuration for the in-process channel transport.
#[derive(Clone, Debug)]
pub struct ChannelTransportConfig {
    /// Frames each direction can hold before `send` fails
    pub capacity: usize,
}

impl Default for ChannelTransportConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ChannelTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// In-process duplex transport backed by a pair of crossbeam queues.
///
/// Sending never calls into the peer. Inbound frames wait in the queue until
/// [`pump`](Self::pump) hands them to the installed handler, or until the
/// loop started by [`spawn_delivery`](Self::spawn_delivery) does.
pub struct ChannelTransport {
    sender: Sender<Bytes>,
    receiver: Receiver<Bytes>,
    handler: Mutex<Option<MessageHandler>>,
    config: ChannelTransportConfig,
    stats: Mutex<TransportStats>,
    name: String,
}

impl ChannelTransport {
    /// Create a pair of connected transports: `(client, host)`.
    pub fn create_pair(name: impl Into<String>, config: ChannelTransportConfig) -> (Self, Self) {
        let name = name.into();
        let capacity = config.capacity.max(1);

        let (tx1, rx1) = bounded(capacity);
        let (tx2, rx2) = bounded(capacity);

        let client = Self {
            sender: tx1,
            receiver: rx2,
            handler: Mutex::new(None),
            config: config.clone(),
            stats: Mutex::new(TransportStats::default()),
            name: format!("{}-client", name),
        };

        let host = Self {
            sender: tx2,
            receiver: rx1,
            handler: Mutex::new(None),
            config,
            stats: Mutex::new(TransportStats::default()),
            name: format!("{}-host", name),
        };

        (client, host)
    }

    /// Number of inbound frames waiting for delivery
    pub fn pending_frames(&self) -> usize {
        self.receiver.len()
    }

    /// Deliver every queued inbound frame to the handler.
    ///
    /// Frames stay queued while no handler is installed. Returns the number
    /// of frames handed over.
    pub fn pump(&self) -> usize {
        let Some(handler) = self.handler.lock().clone() else {
            return 0;
        };

        let mut delivered = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(frame) => {
                    if self.deliver(&handler, &frame) {
                        delivered += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        delivered
    }

    /// Wait up to `timeout` for a frame, then deliver everything queued.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        let Some(handler) = self.handler.lock().clone() else {
            return 0;
        };

        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => usize::from(self.deliver(&handler, &frame)) + self.pump(),
            Err(_) => 0,
        }
    }

    /// Pump inbound frames every `interval` for as long as the transport lives.
    pub fn spawn_delivery(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        spawn_weak_loop(Arc::downgrade(self), interval, |transport: &ChannelTransport| {
            transport.pump();
        })
    }

    fn deliver(&self, handler: &MessageHandler, frame: &Bytes) -> bool {
        match frame_text(frame) {
            Ok(text) => {
                {
                    let mut stats = self.stats.lock();
                    stats.messages_received += 1;
                    stats.bytes_received += frame.len() as u64;
                }
                handler(text);
                true
            }
            Err(e) => {
                self.stats.lock().recv_errors += 1;
                warn!(transport = %self.name, "Dropping inbound frame: {}", e);
                false
            }
        }
    }

    /// Queue raw bytes for the peer, bypassing text validation.
    pub fn send_bytes(&self, data: Bytes) -> TransportResult<()> {
        let len = data.len();
        let result = match self.sender.try_send(data) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::SendFailed {
                reason: format!("queue full ({} frames)", self.config.capacity),
            }),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::Disconnected),
        };

        let mut stats = self.stats.lock();
        match result {
            Ok(()) => {
                stats.messages_sent += 1;
                stats.bytes_sent += len as u64;
            }
            Err(_) => stats.send_errors += 1,
        }

        result
    }
}

fn frame_text(frame: &[u8]) -> TransportResult<&str> {
    std::str::from_utf8(frame)
        .map_err(|e| TransportError::Protocol(format!("frame is not UTF-8: {}", e)))
}

impl Transport for ChannelTransport {
    fn send(&self, text: &str) -> TransportResult<()> {
        self.send_bytes(Bytes::copy_from_slice(text.as_bytes()))
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
