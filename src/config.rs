use crate::message::types::DEFAULT_READY_OBJECT;

/// Configuration for a [`Channel`](crate::Channel).
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Object whose registration completes initialization
    pub ready_object: String,
    /// Send the `initialize` handshake on connect
    pub send_handshake: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ready_object: DEFAULT_READY_OBJECT.to_string(),
            send_handshake: true,
        }
    }
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ready_object(mut self, name: impl Into<String>) -> Self {
        self.ready_object = name.into();
        self
    }

    pub fn with_handshake(mut self, send_handshake: bool) -> Self {
        self.send_handshake = send_handshake;
        self
    }
}
