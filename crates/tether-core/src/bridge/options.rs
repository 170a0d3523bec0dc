//! Per-call options

use crate::protocol::MessageId;
use std::time::Duration;

/// Options for `request_with` and `stream_with`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Use this id instead of generating one
    pub message_id: Option<MessageId>,
    /// Override the configured request timeout (requests only)
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the message id
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Override the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
