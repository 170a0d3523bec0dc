//! Bridge lifecycle events

use crate::protocol::MessageId;
use std::time::Duration;

/// Observable bridge lifecycle and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The channel is up
    Connected,
    /// The channel dropped; `rejected` pending exchanges were failed
    Disconnected { reason: String, rejected: usize },
    /// The transport is about to retry
    Reconnecting { attempt: u32, delay: Duration },
    /// An inbound frame could not be decoded and was dropped
    DecodeError { reason: String },
    /// A reply arrived for an exchange that already closed
    UnmatchedReply {
        message_id: MessageId,
        message_type: String,
    },
    /// The transport stopped for good
    Closed,
}

impl BridgeEvent {
    /// Short name for logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::DecodeError { .. } => "decode_error",
            Self::UnmatchedReply { .. } => "unmatched_reply",
            Self::Closed => "closed",
        }
    }
}
