//! Channel transports
//!
//! A transport is a duplex pipe of JSON text frames. It owns connection
//! lifecycle and reconnect policy; the bridge only sees [`TransportEvent`]s.
//!
//! ## Available Transports
//!
//! - **WebSocket**: client connection to the assistant service, with reconnect
//! - **Line**: newline-delimited JSON over any async reader/writer (stdio webview bridge)
//! - **Memory**: in-process pair, used by embedders and tests

pub mod line;
pub mod memory;
pub mod websocket;

pub use line::LineTransport;
pub use memory::{MemoryPeer, MemoryTransport};
pub use websocket::WebSocketTransport;

use crate::config::TransportConfig;
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the lifecycle/frame event queue handed to the bridge
pub(crate) const EVENT_QUEUE: usize = 256;

/// Something a transport reports to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is (re)established
    Connected,
    /// One inbound text frame
    Frame(String),
    /// The channel dropped unexpectedly
    Disconnected { reason: String },
    /// A reconnect attempt is scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// The transport stopped for good
    Closed,
}

/// Duplex frame pipe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Establish the channel and return its event stream.
    ///
    /// The stream yields inbound frames and lifecycle events until the
    /// transport is closed.
    async fn connect(&self) -> BridgeResult<mpsc::Receiver<TransportEvent>>;

    /// Queue one text frame for sending.
    ///
    /// Fails with `ChannelClosed` while disconnected and with a transport
    /// error when the bounded send queue is full. Never blocks.
    fn send(&self, text: String) -> BridgeResult<()>;

    /// Stop the transport
    async fn close(&self);

    /// Whether frames can currently be sent
    fn is_connected(&self) -> bool;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Which transport to build from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// WebSocket client
    #[default]
    Websocket,
    /// JSON lines on stdin/stdout
    Stdio,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Websocket => write!(f, "websocket"),
            Self::Stdio => write!(f, "stdio"),
        }
    }
}

/// Map a bounded-queue `try_send` failure to a bridge error
pub(crate) fn queue_error<T>(err: mpsc::error::TrySendError<T>) -> BridgeError {
    match err {
        mpsc::error::TrySendError::Full(_) => BridgeError::transport("send queue is full"),
        mpsc::error::TrySendError::Closed(_) => BridgeError::channel_closed(),
    }
}

/// Build the transport described by `config`
pub fn from_config(config: &TransportConfig) -> BridgeResult<Arc<dyn ChannelTransport>> {
    match config.kind {
        TransportKind::Websocket => {
            let url = config
                .url
                .clone()
                .ok_or_else(|| BridgeError::config("transport.url is required for websocket"))?;
            Ok(Arc::new(
                WebSocketTransport::new(url)
                    .with_send_queue(config.send_queue)
                    .with_reconnect(config.reconnect.clone()),
            ))
        }
        TransportKind::Stdio => Ok(Arc::new(LineTransport::stdio().with_send_queue(config.send_queue))),
    }
}
