//! Session handshake result

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Opaque session identifier issued by the assistant service
///
/// Obtained once per bridge lifetime. The bridge never looks inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    value: Value,
    established_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(value: Value) -> Self {
        Self {
            value,
            established_at: Utc::now(),
        }
    }

    /// Raw payload of the handshake reply
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The payload when it is a plain string
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// When the handshake completed
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}
