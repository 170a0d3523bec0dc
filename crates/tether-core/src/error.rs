//! Error types for the Tether bridge
//!
//! Only exchange-level outcomes (`Timeout`, `Cancelled`, `ChannelClosed`) and
//! caller mistakes are ever returned to UI or command code. Transport and
//! decode failures are absorbed and logged by the dispatcher.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A frame could not be decoded
    #[error("Decode error: {reason}")]
    Decode { reason: String },

    /// The channel to the assistant service is down
    #[error("Channel closed{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    ChannelClosed { reason: Option<String> },

    /// No reply arrived before the deadline
    #[error("Request timeout after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The exchange was aborted by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// A stream consumer fell behind and its chunk queue filled up
    #[error("Stream closed: {capacity} chunks were waiting to be read")]
    StreamOverflow { capacity: usize },

    /// The router has no rule for a message type and no default route
    #[error("No route for message type '{message_type}'")]
    UnroutableType { message_type: String },

    /// A correlation id is already in use by an open exchange
    #[error("Message id '{id}' is already in use by an open exchange")]
    DuplicateMessageId { id: String },

    /// A handler or interceptor registration was rejected
    #[error("Invalid registration: {message}")]
    InvalidRegistration { message: String },

    /// A local handler or interceptor failed
    #[error("Handler error for '{message_type}': {message}")]
    Handler {
        message_type: String,
        message: String,
    },

    /// Transport-level failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl BridgeError {
    /// Create a new Decode error
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create a ChannelClosed error without a reason
    pub fn channel_closed() -> Self {
        Self::ChannelClosed { reason: None }
    }

    /// Create a ChannelClosed error with a reason
    pub fn channel_closed_because(reason: impl Into<String>) -> Self {
        Self::ChannelClosed {
            reason: Some(reason.into()),
        }
    }

    /// Create a new Timeout error
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout { after }
    }

    /// Create a new StreamOverflow error
    pub fn stream_overflow(capacity: usize) -> Self {
        Self::StreamOverflow { capacity }
    }

    /// Create a new UnroutableType error
    pub fn unroutable(message_type: impl Into<String>) -> Self {
        Self::UnroutableType {
            message_type: message_type.into(),
        }
    }

    /// Create a new DuplicateMessageId error
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateMessageId { id: id.into() }
    }

    /// Create a new InvalidRegistration error
    pub fn invalid_registration(message: impl Into<String>) -> Self {
        Self::InvalidRegistration {
            message: message.into(),
        }
    }

    /// Create a new Handler error
    pub fn handler(message_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            message_type: message_type.into(),
            message: message.into(),
        }
    }

    /// Create a new Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new Config error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "BRIDGE_DECODE",
            Self::ChannelClosed { .. } => "BRIDGE_CHANNEL_CLOSED",
            Self::Timeout { .. } => "BRIDGE_TIMEOUT",
            Self::Cancelled => "BRIDGE_CANCELLED",
            Self::StreamOverflow { .. } => "BRIDGE_STREAM_OVERFLOW",
            Self::UnroutableType { .. } => "BRIDGE_UNROUTABLE",
            Self::DuplicateMessageId { .. } => "BRIDGE_DUPLICATE_ID",
            Self::InvalidRegistration { .. } => "BRIDGE_INVALID_REGISTRATION",
            Self::Handler { .. } => "BRIDGE_HANDLER",
            Self::Transport { .. } => "BRIDGE_TRANSPORT",
            Self::Config { .. } => "BRIDGE_CONFIG",
            Self::Serialization { .. } => "BRIDGE_SERIALIZATION",
        }
    }

    /// Whether re-issuing the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ChannelClosed { .. } | Self::Timeout { .. } | Self::Transport { .. }
        )
    }

    /// Whether this error means the exchange ended without a reply
    pub fn is_exchange_outcome(&self) -> bool {
        matches!(
            self,
            Self::ChannelClosed { .. }
                | Self::Timeout { .. }
                | Self::Cancelled
                | Self::StreamOverflow { .. }
        )
    }

    /// Single actionable message suitable for showing to an editor user
    pub fn user_message(&self) -> String {
        match self {
            Self::ChannelClosed { .. } => {
                "Lost connection to the assistant service. It will reconnect automatically; try again in a moment.".to_string()
            }
            Self::Timeout { after } => format!(
                "The assistant did not answer within {}s. Try again, or raise request_timeout in the config.",
                after.as_secs()
            ),
            Self::Cancelled => "The request was cancelled.".to_string(),
            Self::StreamOverflow { capacity } => format!(
                "The response was stopped because {} chunks arrived before any were read. Raise stream_buffer in the config.",
                capacity
            ),
            Self::UnroutableType { message_type } => {
                format!("'{}' is not a known message type.", message_type)
            }
            Self::Config { message, .. } => {
                format!("Configuration problem: {}. Check tether_config.json.", message)
            }
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_closed_display() {
        assert_eq!(BridgeError::channel_closed().to_string(), "Channel closed");
        assert_eq!(
            BridgeError::channel_closed_because("socket reset").to_string(),
            "Channel closed: socket reset"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = BridgeError::timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Request timeout after 1500ms");
        assert_eq!(err.error_code(), "BRIDGE_TIMEOUT");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BridgeError::channel_closed().is_retryable());
        assert!(BridgeError::timeout(Duration::from_secs(1)).is_retryable());
        assert!(!BridgeError::Cancelled.is_retryable());
        assert!(!BridgeError::decode("bad").is_retryable());
    }

    #[test]
    fn test_exchange_outcomes() {
        assert!(BridgeError::Cancelled.is_exchange_outcome());
        assert!(BridgeError::channel_closed().is_exchange_outcome());
        assert!(!BridgeError::unroutable("x").is_exchange_outcome());
    }

    #[test]
    fn test_stream_overflow_classification() {
        let err = BridgeError::stream_overflow(64);
        assert_eq!(err.error_code(), "BRIDGE_STREAM_OVERFLOW");
        assert!(err.is_exchange_outcome());
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("stream_buffer"));
    }

    #[test]
    fn test_user_message_is_actionable() {
        let msg = BridgeError::timeout(Duration::from_secs(30)).user_message();
        assert!(msg.contains("30s"));
        assert!(msg.contains("request_timeout"));
    }

    #[test]
    fn test_from_serde_error() {
        let err: BridgeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.error_code(), "BRIDGE_SERIALIZATION");
    }
}
