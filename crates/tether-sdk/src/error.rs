//! SDK error types

use tether_core::BridgeError;
use thiserror::Error;

/// Result type for SDK calls
pub type SdkResult<T> = Result<T, SdkError>;

/// Errors from typed protocol calls
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SdkError {
    /// The exchange itself failed
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The reply arrived but its payload is not the expected shape
    #[error("Unexpected '{message_type}' payload: {reason}")]
    UnexpectedPayload { message_type: String, reason: String },

    /// A request payload could not be serialized
    #[error("Cannot encode '{message_type}' payload: {reason}")]
    Encode { message_type: String, reason: String },
}

impl SdkError {
    /// Create an unexpected-payload error
    pub fn unexpected(message_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedPayload {
            message_type: message_type.into(),
            reason: reason.into(),
        }
    }

    /// Create an encode error
    pub fn encode(message_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encode {
            message_type: message_type.into(),
            reason: reason.into(),
        }
    }

    /// The underlying bridge error, if any
    pub fn as_bridge(&self) -> Option<&BridgeError> {
        match self {
            Self::Bridge(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the caller aborted the exchange
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Bridge(BridgeError::Cancelled))
    }
}
