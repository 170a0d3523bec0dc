//! Frame encoding and validation
//!
//! Decoding never panics on malformed input. Every rejection comes back as
//! [`BridgeError::Decode`] so the dispatcher can log it, publish a
//! decode-error event, and keep the connection open.

use super::frame::{Frame, MessageId};
use crate::error::{BridgeError, BridgeResult};
use serde_json::Value;

/// Pure, side-effect-free frame codec
#[derive(Debug, Clone, Copy, Default)]
pub struct Framer;

impl Framer {
    /// Create a framer
    pub fn new() -> Self {
        Self
    }

    /// Serialize a frame to its JSON text form
    pub fn encode(&self, frame: &Frame) -> BridgeResult<String> {
        if frame.message_type.is_empty() {
            return Err(BridgeError::serialization("frame has an empty messageType"));
        }
        Ok(serde_json::to_string(frame)?)
    }

    /// Parse and validate a frame from JSON text
    pub fn decode(&self, text: &str) -> BridgeResult<Frame> {
        let value: Value = serde_json::from_str(text.trim())
            .map_err(|e| BridgeError::decode(format!("invalid JSON: {}", e)))?;
        self.decode_value(value)
    }

    /// Validate an already-parsed JSON value as a frame
    pub fn decode_value(&self, value: Value) -> BridgeResult<Frame> {
        let Value::Object(mut map) = value else {
            return Err(BridgeError::decode("frame is not a JSON object"));
        };

        let message_type = match map.remove("messageType") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::String(_)) => return Err(BridgeError::decode("messageType is empty")),
            Some(other) => {
                return Err(BridgeError::decode(format!(
                    "messageType must be a string, got {}",
                    json_kind(&other)
                )));
            }
            None => return Err(BridgeError::decode("missing messageType")),
        };

        let message_id = match map.remove("messageId") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(MessageId::from(s)),
            Some(other) => {
                return Err(BridgeError::decode(format!(
                    "messageId must be a string, got {}",
                    json_kind(&other)
                )));
            }
        };

        let data = map.remove("data").unwrap_or(Value::Null);

        Ok(Frame {
            message_type,
            data,
            message_id,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
