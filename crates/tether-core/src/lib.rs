//! Tether Core Library
//!
//! Message bus between an editor surface and a long-running assistant
//! service: JSON frame codec, request/reply correlation, routing between
//! local handlers and the remote service, push subscriptions, and the
//! channel transports with reconnect.

pub mod bridge;
pub mod config;
pub mod correlation;
pub mod error;
pub mod protocol;
pub mod recovery;
pub mod router;
pub mod subscriptions;
pub mod transport;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeEvent, ChunkStream, PendingReply, RequestOptions, Session};
pub use config::{BridgeConfig, ConfigLoader, LogFormat, LoggingConfig, load_config, load_from_file};
pub use correlation::CorrelationTable;
pub use error::{BridgeError, BridgeResult};
pub use protocol::{Frame, Framer, IdStrategy, MessageId, TerminationRules, TerminationStyle};
pub use recovery::ReconnectConfig;
pub use router::{DefaultRoute, Interceptor, LocalHandler, RouteDecision, Router};
pub use subscriptions::{EventHandler, PushEvent, Subscription};
pub use transport::{
    ChannelTransport, LineTransport, MemoryPeer, MemoryTransport, TransportEvent, TransportKind,
    WebSocketTransport,
};
