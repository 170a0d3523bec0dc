//! In-process transport pair
//!
//! [`MemoryTransport`] is the bridge side; [`MemoryPeer`] plays the assistant
//! service. The peer can push frames, read what the bridge sent, and
//! simulate channel loss and recovery.

use super::{ChannelTransport, EVENT_QUEUE, TransportEvent, queue_error};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Frame, Framer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Default bound of the bridge-to-peer queue
pub const DEFAULT_MEMORY_QUEUE: usize = 256;

#[derive(Debug)]
struct Shared {
    connected: AtomicBool,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl Shared {
    fn events(&self) -> Option<mpsc::Sender<TransportEvent>> {
        self.events.lock().clone()
    }
}

/// Bridge side of an in-process channel
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<String>,
}

/// Remote side of an in-process channel
#[derive(Debug)]
pub struct MemoryPeer {
    shared: Arc<Shared>,
    inbound: mpsc::Receiver<String>,
    framer: Framer,
}

impl MemoryTransport {
    /// Create a connected pair with the default queue bound
    pub fn pair() -> (Self, MemoryPeer) {
        Self::pair_with_queue(DEFAULT_MEMORY_QUEUE)
    }

    /// Create a pair whose bridge-to-peer queue holds `queue` frames
    pub fn pair_with_queue(queue: usize) -> (Self, MemoryPeer) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            events: Mutex::new(None),
        });
        (
            Self {
                shared: shared.clone(),
                outbound: tx,
            },
            MemoryPeer {
                shared,
                inbound: rx,
                framer: Framer::new(),
            },
        )
    }
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    async fn connect(&self) -> BridgeResult<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        *self.shared.events.lock() = Some(tx.clone());
        self.shared.connected.store(true, Ordering::SeqCst);
        let _ = tx.send(TransportEvent::Connected).await;
        Ok(rx)
    }

    fn send(&self, text: String) -> BridgeResult<()> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(BridgeError::channel_closed());
        }
        self.outbound.try_send(text).map_err(queue_error)
    }

    async fn close(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        let events = self.shared.events.lock().take();
        if let Some(events) = events {
            let _ = events.send(TransportEvent::Closed).await;
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryPeer {
    async fn emit(&self, event: TransportEvent) -> BridgeResult<()> {
        let events = self.shared.events().ok_or_else(BridgeError::channel_closed)?;
        events
            .send(event)
            .await
            .map_err(|_| BridgeError::channel_closed())
    }

    /// Deliver a frame to the bridge
    pub async fn push(&self, frame: Frame) -> BridgeResult<()> {
        let text = self.framer.encode(&frame)?;
        self.push_text(text).await
    }

    /// Deliver raw text to the bridge, valid or not
    pub async fn push_text(&self, text: impl Into<String>) -> BridgeResult<()> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(BridgeError::channel_closed());
        }
        self.emit(TransportEvent::Frame(text.into())).await
    }

    /// Next frame the bridge sent, skipping undecodable text
    pub async fn recv(&mut self) -> Option<Frame> {
        while let Some(text) = self.inbound.recv().await {
            if let Ok(frame) = self.framer.decode(&text) {
                return Some(frame);
            }
        }
        None
    }

    /// Next frame the bridge sent, if one is already queued
    pub fn try_recv(&mut self) -> Option<Frame> {
        while let Ok(text) = self.inbound.try_recv() {
            if let Ok(frame) = self.framer.decode(&text) {
                return Some(frame);
            }
        }
        None
    }

    /// Simulate unexpected channel loss
    pub async fn disconnect(&self, reason: impl Into<String>) -> BridgeResult<()> {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Disconnected {
            reason: reason.into(),
        })
        .await
    }

    /// Simulate the channel coming back
    pub async fn reconnect(&self) -> BridgeResult<()> {
        self.shared.connected.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Connected).await
    }

    /// Whether the bridge side is connected
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}
