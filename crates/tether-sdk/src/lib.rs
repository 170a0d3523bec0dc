//! Tether SDK
//!
//! Typed layer over the [`tether_core::Bridge`]: the assistant protocol's
//! message types, payload shapes, a request client, editor push events and
//! the editor-context interceptor.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use tether_core::{Bridge, BridgeConfig, WebSocketTransport};
//! use tether_sdk::{AssistantClient, ChatMessage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(WebSocketTransport::new("ws://localhost:3000"));
//! let bridge = Bridge::connect(BridgeConfig::default(), transport).await?;
//! let client = AssistantClient::new(bridge);
//!
//! let mut deltas = client.stream_chat(vec![ChatMessage::user("Explain this function")]);
//! while let Some(delta) = deltas.next().await {
//!     print!("{}", delta?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod context;
pub mod error;
pub mod events;
pub mod message_types;
pub mod payloads;

pub use client::{AssistantClient, TextStream};
pub use context::{EditorContextInterceptor, EditorContextProvider};
pub use error::{SdkError, SdkResult};
pub use events::{EditorEvent, EditorEvents};
pub use payloads::{
    ChatMessage, ChatRole, ContextItem, ContextItemId, Position, Range, RangeInFileWithContents,
    SessionInfo,
};

// Re-export commonly used types from core
pub use tether_core::{Bridge, BridgeConfig, BridgeError, BridgeResult, Frame, MessageId};
