use std::fmt::Debug;
use std::sync::Arc;

use crate::error::TransportResult;

pub mod channel;
pub mod memory;
pub mod utils;

pub use utils::spawn_weak_loop;

/// Inbound hook a transport calls once per discrete text message.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Duplex text transport the channel runs on.
///
/// Implementations deliver inbound messages by calling the installed
/// [`MessageHandler`], one call per message, in arrival order.
pub trait Transport: Send + Sync + Debug {
    /// Send one wire-form message
    fn send(&self, text: &str) -> TransportResult<()>;

    /// Install the inbound-message hook, replacing any previous one
    fn set_message_handler(&self, handler: MessageHandler);

    /// Whether the transport can currently send
    fn is_connected(&self) -> bool {
        true
    }

    /// Get transport statistics
    fn stats(&self) -> Option<TransportStats> {
        None
    }

    /// Get transport name/identifier
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Statistics collected by transport implementations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
    pub recv_errors: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: &TransportStats) {
        self.messages_sent += other.messages_sent;
        self.messages_received += other.messages_received;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
        self.send_errors += other.send_errors;
        self.recv_errors += other.recv_errors;
    }
}

impl std::fmt::Display for TransportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Transport Statistics:")?;
        writeln!(f, "  Messages sent:     {}", self.messages_sent)?;
        writeln!(f, "  Messages received: {}", self.messages_received)?;
        writeln!(f, "  Bytes sent:        {}", self.bytes_sent)?;
        writeln!(f, "  Bytes received:    {}", self.bytes_received)?;
        writeln!(f, "  Send errors:       {}", self.send_errors)?;
        writeln!(f, "  Receive errors:    {}", self.recv_errors)?;
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, text: &str) -> TransportResult<()> {
        (**self).send(text)
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        (**self).set_message_handler(handler);
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn stats(&self) -> Option<TransportStats> {
        (**self).stats()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, text: &str) -> TransportResult<()> {
        (**self).send(text)
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        (**self).set_message_handler(handler);
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn stats(&self) -> Option<TransportStats> {
        (**self).stats()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
