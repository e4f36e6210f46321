use serde::{Deserialize, Serialize};

/// Name of the object whose registration marks the host's object set as complete.
pub const DEFAULT_READY_OBJECT: &str = "self";

/// Correlation token linking an invocation to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn from_raw(id: u64) -> Self {
        RequestId(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of an inbound message, decided once when the message is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Response,
    Signal,
    PropertyUpdate,
    /// Untagged object definitions
    Definition,
}

impl MessageKind {
    /// Map a `type` tag to its kind. Definitions carry no tag and never match.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "response" => Some(MessageKind::Response),
            "signal" => Some(MessageKind::Signal),
            "propertyUpdate" => Some(MessageKind::PropertyUpdate),
            _ => None,
        }
    }

    pub fn tag(self) -> Option<&'static str> {
        match self {
            MessageKind::Response => Some("response"),
            MessageKind::Signal => Some("signal"),
            MessageKind::PropertyUpdate => Some("propertyUpdate"),
            MessageKind::Definition => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag().unwrap_or("definition"))
    }
}
