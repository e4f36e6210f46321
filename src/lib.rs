//! remote-channel - client-side proxies for objects living in a host process
//!
//! A [`Channel`] runs a small JSON protocol over any duplex text
//! [`Transport`]: the host announces its objects, the client calls their
//! methods (optionally correlating responses by request id), and the host
//! pushes signals and property updates back.
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod proxy;
pub mod signal;
pub mod transport;

pub use channel::{Channel, ChannelStats, ReadyCallback, ResponseCallback};
pub use codec::JsonCodec;
pub use config::ChannelConfig;
pub use error::{ChannelError, Result, TransportError, TransportResult};
pub use message::types::{DEFAULT_READY_OBJECT, MessageKind, RequestId};
pub use message::{IncomingMessage, ObjectDefinition, ObjectUpdate, OutgoingMessage};
pub use proxy::RemoteObjectProxy;
pub use signal::{Callback, SignalEmitter, callback};
pub use transport::channel::{ChannelTransport, ChannelTransportConfig};
pub use transport::memory::MemoryTransport;
pub use transport::{MessageHandler, Transport, TransportStats, spawn_weak_loop};
