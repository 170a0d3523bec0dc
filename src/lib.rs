//! Tether
//!
//! Message bus bridging editor surfaces and a long-running assistant
//! service. This crate re-exports the bus ([`tether_core`]) and the typed
//! protocol client ([`tether_sdk`]); the `tether` binary lives in
//! `crates/tether-cli`.

pub use tether_core as core;
pub use tether_sdk as sdk;

pub use tether_core::{
    Bridge, BridgeConfig, BridgeError, BridgeEvent, BridgeResult, ChannelTransport, ChunkStream,
    Frame, LineTransport, MemoryPeer, MemoryTransport, MessageId, PendingReply, RequestOptions,
    WebSocketTransport,
};
pub use tether_sdk::{AssistantClient, EditorEvent, EditorEvents, SdkError, SdkResult};
