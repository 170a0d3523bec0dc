//! Frame and correlation id types

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// Message type of the abort control frame
pub const ABORT_MESSAGE_TYPE: &str = "abort";

/// Correlation id linking a request to its reply or stream chunks
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an existing id string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One discrete unit of wire communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Message type (e.g. `llm/streamChat`)
    pub message_type: String,
    /// Arbitrary payload; the bridge only looks at the `done` flag
    #[serde(default)]
    pub data: Value,
    /// Correlation id; absent on push events and one-way posts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl Frame {
    /// Create a frame without a correlation id
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            message_id: None,
        }
    }

    /// Attach a correlation id
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Build the abort control frame for `target`
    pub fn abort(target: &MessageId, id: MessageId) -> Self {
        Self::new(ABORT_MESSAGE_TYPE, json!({ "targetId": target.as_str() })).with_id(id)
    }

    /// Target id carried by an abort control frame
    pub fn abort_target(&self) -> Option<MessageId> {
        if self.message_type != ABORT_MESSAGE_TYPE {
            return None;
        }
        self.data
            .get("targetId")
            .and_then(Value::as_str)
            .map(MessageId::from)
    }

    /// Whether this is a push event or one-way notification
    pub fn is_event(&self) -> bool {
        self.message_id.is_none()
    }

    /// Id as a string slice, if present
    pub fn id_str(&self) -> Option<&str> {
        self.message_id.as_ref().map(MessageId::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_serializes_camel_case() {
        let frame = Frame::new("llm/complete", json!({"prompt": "hi"})).with_id("abc");
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["messageType"], "llm/complete");
        assert_eq!(v["messageId"], "abc");
        assert_eq!(v["data"]["prompt"], "hi");
    }

    #[test]
    fn test_event_frame_omits_id() {
        let frame = Frame::new("indexProgress", json!({"progress": 0.5}));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("messageId"));
        assert!(frame.is_event());
    }

    #[test]
    fn test_abort_frame_shape() {
        let frame = Frame::abort(&MessageId::from("req-1"), MessageId::from("req-2"));
        assert_eq!(frame.message_type, ABORT_MESSAGE_TYPE);
        assert_eq!(frame.data["targetId"], "req-1");
        assert_eq!(frame.id_str(), Some("req-2"));
        assert_eq!(frame.abort_target(), Some(MessageId::from("req-1")));
    }

    #[test]
    fn test_abort_target_ignores_other_types() {
        let frame = Frame::new("llm/complete", json!({"targetId": "x"}));
        assert_eq!(frame.abort_target(), None);
    }
}
