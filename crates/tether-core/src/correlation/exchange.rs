//! Pending exchange types

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Frame, MessageId, TerminationStyle};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Terminal frame of a stream that ended normally
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEnd {
    /// The terminal frame exactly as received
    pub frame: Frame,
    /// Trailing payload extracted by the termination style
    pub completion: Option<Value>,
}

/// Shared close state of a streaming exchange
///
/// Closing is synchronous: once `close_with` returns, the consumer's next
/// poll observes the outcome, even if chunks are still buffered. A normal
/// end is recorded here rather than queued, so it never waits for space.
#[derive(Debug, Default)]
pub struct StreamState {
    token: CancellationToken,
    outcome: Mutex<Option<BridgeError>>,
    end: Mutex<Option<StreamEnd>>,
}

impl StreamState {
    /// Create an open stream state
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the stream with an error outcome. The first outcome wins.
    pub fn close_with(&self, outcome: BridgeError) {
        {
            let mut slot = self.outcome.lock();
            if slot.is_none() {
                *slot = Some(outcome);
            }
        }
        self.token.cancel();
    }

    /// Record the terminal frame
    pub fn finish(&self, end: StreamEnd) {
        *self.end.lock() = Some(end);
    }

    /// Whether the stream was closed with an error
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Outcome recorded by `close_with`
    pub fn outcome(&self) -> Option<BridgeError> {
        self.outcome.lock().clone()
    }

    /// Take the terminal frame recorded by `finish`
    pub fn take_end(&self) -> Option<StreamEnd> {
        self.end.lock().take()
    }

    /// Token cancelled when the stream is closed
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Kind of pending exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Resolves once with the first matching reply
    Single,
    /// Accumulates chunks until a terminal marker
    Streaming,
}

pub(crate) enum Slot {
    Single(oneshot::Sender<BridgeResult<Frame>>),
    Streaming {
        tx: mpsc::Sender<Frame>,
        state: Arc<StreamState>,
        style: TerminationStyle,
    },
}

impl Slot {
    pub(crate) fn kind(&self) -> ExchangeKind {
        match self {
            Self::Single(_) => ExchangeKind::Single,
            Self::Streaming { .. } => ExchangeKind::Streaming,
        }
    }

    /// Complete the exchange with an error outcome
    pub(crate) fn fail(self, outcome: BridgeError) {
        match self {
            Self::Single(tx) => {
                let _ = tx.send(Err(outcome));
            }
            Self::Streaming { state, .. } => state.close_with(outcome),
        }
    }
}

pub(crate) struct Entry {
    pub(crate) seq: u64,
    pub(crate) message_type: String,
    pub(crate) remote: bool,
    pub(crate) sent: bool,
    pub(crate) slot: Slot,
}

/// What was removed when an exchange was closed early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedExchange {
    /// Message type of the original call
    pub message_type: String,
    /// Kind of exchange
    pub kind: ExchangeKind,
    /// Whether the exchange was routed to the remote service
    pub remote: bool,
    /// Whether its request frame had been handed to the transport
    pub sent: bool,
}

impl ClosedExchange {
    /// Whether the remote side should be told to stop producing
    pub fn needs_remote_abort(&self) -> bool {
        self.remote && self.sent
    }
}

/// Result of handing a chunk to a stream consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the consumer
    Delivered,
    /// The consumer is gone or the stream already closed
    Closed,
    /// The consumer's queue is full
    Full,
}

/// A chunk to deliver to a stream consumer outside the table lock
#[derive(Debug)]
pub struct Feed {
    /// Exchange the chunk belongs to
    pub id: MessageId,
    /// Consumer queue
    pub tx: mpsc::Sender<Frame>,
    /// Close state
    pub state: Arc<StreamState>,
    /// Chunk to deliver
    pub chunk: Frame,
}

impl Feed {
    /// Queue the chunk without waiting for space
    pub fn try_deliver(self) -> Delivery {
        if self.state.is_closed() {
            return Delivery::Closed;
        }
        match self.tx.try_send(self.chunk) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
