pub mod types;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use self::types::{MessageKind, RequestId};
use crate::codec::JsonCodec;
use crate::error::{ChannelError, Result};

/// Messages the client sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    Initialize {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RequestId>,
    },
    InvokeMethod {
        object: String,
        method: String,
        args: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RequestId>,
    },
}

impl OutgoingMessage {
    /// The handshake sent when a channel is created
    pub fn initialize() -> Self {
        OutgoingMessage::Initialize { id: None }
    }

    pub fn invoke_method(
        object: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        OutgoingMessage::InvokeMethod {
            object: object.into(),
            method: method.into(),
            args,
            id: None,
        }
    }

    pub fn id(&self) -> Option<RequestId> {
        match self {
            OutgoingMessage::Initialize { id } | OutgoingMessage::InvokeMethod { id, .. } => *id,
        }
    }

    /// Stamp a request id onto the message
    pub fn with_id(mut self, request_id: RequestId) -> Self {
        match &mut self {
            OutgoingMessage::Initialize { id } | OutgoingMessage::InvokeMethod { id, .. } => {
                *id = Some(request_id);
            }
        }
        self
    }
}

/// Shape of a remote object as announced by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDefinition {
    /// Method name to declared parameter count
    pub methods: BTreeMap<String, usize>,
    /// Property name to initial value
    pub properties: Map<String, Value>,
    /// Signal name to declared argument types
    pub signals: BTreeMap<String, Vec<Value>>,
}

impl ObjectDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, name: impl Into<String>, arity: usize) -> Self {
        self.methods.insert(name.into(), arity);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_signal(mut self, name: impl Into<String>, arg_types: Vec<Value>) -> Self {
        self.signals.insert(name.into(), arg_types);
        self
    }

    /// Whether `value` can hold a definition. Members other than methods,
    /// properties and signals are ignored.
    pub fn has_shape(value: &Value) -> bool {
        value.is_object()
    }

    fn from_value(name: &str, value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            ChannelError::MalformedMessage(format!("invalid definition for `{}`: {}", name, e))
        })
    }
}

/// Property changes for one object inside a property update.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectUpdate {
    pub object: String,
    /// Property name to the notifier arguments carrying the new value
    pub changes: Map<String, Value>,
}

/// Messages the host sends to the client, classified once at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Response {
        id: Option<RequestId>,
        data: Value,
    },
    Signal {
        object: String,
        signal: String,
        args: Vec<Value>,
    },
    PropertyUpdate {
        updates: Vec<ObjectUpdate>,
    },
    Definition {
        objects: Vec<(String, ObjectDefinition)>,
    },
}

#[derive(Deserialize)]
struct ResponseFields {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    data: Value,
}

impl ResponseFields {
    /// Missing or null ids yield `None`; anything else must be a request id.
    fn request_id(&self) -> Result<Option<RequestId>> {
        match &self.id {
            Value::Null => Ok(None),
            id => id
                .as_u64()
                .map(|raw| Some(RequestId::from_raw(raw)))
                .ok_or_else(|| ChannelError::UnknownRequestId(id.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct SignalFields {
    object: String,
    signal: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Deserialize)]
struct PropertyUpdateFields {
    #[serde(default)]
    data: Map<String, Value>,
}

impl IncomingMessage {
    /// Parse wire text into a message
    pub fn parse(text: &str) -> Result<Self> {
        let map = JsonCodec.decode(text)?;
        Self::from_map(map)
    }

    /// Classify a decoded record. A `type` field makes the message tagged;
    /// without one it must be an object definition.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        match map.get("type") {
            Some(Value::String(tag)) => {
                let tag = tag.clone();
                Self::from_tagged(&tag, map)
            }
            Some(other) => Err(ChannelError::MalformedMessage(format!(
                "`type` must be a string, got {}",
                other
            ))),
            None => Self::from_untagged(map),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            IncomingMessage::Response { .. } => MessageKind::Response,
            IncomingMessage::Signal { .. } => MessageKind::Signal,
            IncomingMessage::PropertyUpdate { .. } => MessageKind::PropertyUpdate,
            IncomingMessage::Definition { .. } => MessageKind::Definition,
        }
    }

    fn from_tagged(tag: &str, map: Map<String, Value>) -> Result<Self> {
        let kind = MessageKind::from_tag(tag).ok_or_else(|| {
            ChannelError::UnrecognizedMessage(format!("unknown message type `{}`", tag))
        })?;
        let value = Value::Object(map);

        match kind {
            MessageKind::Response => {
                let fields: ResponseFields = parse_fields(kind, value)?;
                Ok(IncomingMessage::Response {
                    id: fields.request_id()?,
                    data: fields.data,
                })
            }
            MessageKind::Signal => {
                let fields: SignalFields = parse_fields(kind, value)?;
                Ok(IncomingMessage::Signal {
                    object: fields.object,
                    signal: fields.signal,
                    args: fields.args,
                })
            }
            MessageKind::PropertyUpdate => {
                let fields: PropertyUpdateFields = parse_fields(kind, value)?;
                let updates = fields
                    .data
                    .into_iter()
                    .filter_map(|(object, changes)| match changes {
                        Value::Object(changes) => Some(ObjectUpdate { object, changes }),
                        other => {
                            debug!(object = %object, changes = %other, "Skipping non-object property changes");
                            None
                        }
                    })
                    .collect();
                Ok(IncomingMessage::PropertyUpdate { updates })
            }
            MessageKind::Definition => Err(ChannelError::UnrecognizedMessage(format!(
                "definitions are never tagged, got `{}`",
                tag
            ))),
        }
    }

    fn from_untagged(map: Map<String, Value>) -> Result<Self> {
        // Single-object form: {"object": name, "data": definition}
        if let (Some(Value::String(name)), Some(data)) = (map.get("object"), map.get("data")) {
            if ObjectDefinition::has_shape(data) {
                let definition = ObjectDefinition::from_value(name, data.clone())?;
                return Ok(IncomingMessage::Definition {
                    objects: vec![(name.clone(), definition)],
                });
            }
        }

        if map.is_empty() || !map.values().all(ObjectDefinition::has_shape) {
            return Err(ChannelError::UnrecognizedMessage(format!(
                "no message type and no object definition in {}",
                Value::Object(map)
            )));
        }

        let objects = map
            .into_iter()
            .map(|(name, value)| {
                let definition = ObjectDefinition::from_value(&name, value)?;
                Ok((name, definition))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(IncomingMessage::Definition { objects })
    }
}

fn parse_fields<T: for<'de> Deserialize<'de>>(kind: MessageKind, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ChannelError::MalformedMessage(format!("invalid {} message: {}", kind, e)))
}
