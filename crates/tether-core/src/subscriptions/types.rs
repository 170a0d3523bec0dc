//! Push event type

use crate::protocol::{Frame, MessageId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A server-initiated frame dispatched by type to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    /// Message type
    pub message_type: String,
    /// Payload
    pub data: Value,
    /// Id carried by the frame, if the sender attached one
    pub message_id: Option<MessageId>,
    /// When the frame was dispatched
    pub received_at: DateTime<Utc>,
}

impl PushEvent {
    /// Wrap an inbound frame
    pub fn from_frame(frame: Frame) -> Self {
        Self {
            message_type: frame.message_type,
            data: frame.data,
            message_id: frame.message_id,
            received_at: Utc::now(),
        }
    }

    /// Decode the payload into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}
