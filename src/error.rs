use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Invalid transport: {0}")]
    InvalidTransport(String),

    #[error("Cannot connect callback to `{member}` on object `{object}`")]
    InvalidCallback { object: String, member: String },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Received response for unknown request id: {0}")]
    UnknownRequestId(String),

    #[error("Unrecognized message: {0}")]
    UnrecognizedMessage(String),

    #[error("Object `{object}` has no member `{member}`")]
    UnknownMember { object: String, member: String },

    #[error("Method `{method}` takes {arity} arguments, {given} given")]
    TooManyArguments {
        method: String,
        arity: usize,
        given: usize,
    },

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport disconnected")]
    Disconnected,

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::Serialization(err.to_string())
    }
}
