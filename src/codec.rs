use serde::Serialize;
use serde_json::Value;

use crate::error::{ChannelError, Result};

/// JSON text codec for the wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a serializable value into wire text
    pub fn encode<T: Serialize>(&self, data: &T) -> Result<String> {
        Ok(serde_json::to_string(data)?)
    }

    /// Decode wire text into a structured record.
    ///
    /// Anything that is not valid JSON, or valid JSON that is not an object,
    /// is reported as a malformed message.
    pub fn decode(&self, text: &str) -> Result<serde_json::Map<String, Value>> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ChannelError::MalformedMessage(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            ))),
            Err(e) => Err(ChannelError::MalformedMessage(e.to_string())),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
