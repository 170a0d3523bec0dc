//! Inbound frame dispatch
//!
//! A single task drains the transport's event stream, so frames for one id
//! are always handled in arrival order. Matching order for a decoded frame:
//! open exchange, recently closed exchange, reverse request (id plus a
//! local handler), then push subscribers.
//!
//! The task never waits on a consumer. A stream whose queue is full is
//! closed with `StreamOverflow`, and push events are handed to the push
//! worker through a bounded queue.

use super::{BridgeEvent, BridgeInner, run_local};
use crate::correlation::{Delivery, Inbound};
use crate::error::BridgeError;
use crate::protocol::{ABORT_MESSAGE_TYPE, Frame, MessageId};
use crate::subscriptions::PushEvent;
use crate::transport::TransportEvent;
use serde_json::json;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

pub(super) async fn run(inner: Weak<BridgeInner>, mut events: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            TransportEvent::Frame(text) => inner.handle_text(&text),
            TransportEvent::Connected => {
                info!(transport = inner.transport.name(), "channel connected");
                inner.emit(BridgeEvent::Connected);
            }
            TransportEvent::Disconnected { reason } => {
                let rejected = inner
                    .table
                    .lock()
                    .reject_all(BridgeError::channel_closed_because(reason.clone()));
                warn!(reason = %reason, rejected = rejected.len(), "channel lost");
                inner.emit(BridgeEvent::Disconnected {
                    reason,
                    rejected: rejected.len(),
                });
            }
            TransportEvent::Reconnecting { attempt, delay } => {
                inner.emit(BridgeEvent::Reconnecting { attempt, delay });
            }
            TransportEvent::Closed => {
                inner.table.lock().reject_all(BridgeError::channel_closed());
                inner.emit(BridgeEvent::Closed);
                break;
            }
        }
    }
    debug!("dispatcher stopped");
}

impl BridgeInner {
    fn handle_text(self: &Arc<Self>, text: &str) {
        let frame = match self.framer.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                self.emit(BridgeEvent::DecodeError {
                    reason: e.to_string(),
                });
                return;
            }
        };
        debug!(message_type = %frame.message_type, id = ?frame.id_str(), "inbound frame");

        let inbound = if frame.message_id.is_some() {
            self.table.lock().accept(frame)
        } else {
            Inbound::Unmatched(frame)
        };

        match inbound {
            Inbound::Resolved => {}
            Inbound::Feed(feed) => {
                let id = feed.id.clone();
                match feed.try_deliver() {
                    Delivery::Delivered => {}
                    Delivery::Closed => debug!(id = %id, "stream closed before chunk was delivered"),
                    Delivery::Full => {
                        let capacity = self.config.stream_buffer;
                        warn!(id = %id, capacity, "stream consumer fell behind, closing stream");
                        self.close_exchange(&id, BridgeError::stream_overflow(capacity), "queue full");
                    }
                }
            }
            Inbound::Late(frame) => {
                if let Some(message_id) = frame.message_id {
                    self.emit(BridgeEvent::UnmatchedReply {
                        message_id,
                        message_type: frame.message_type,
                    });
                }
            }
            Inbound::Unmatched(frame) => self.handle_unmatched(frame),
        }
    }

    fn handle_unmatched(self: &Arc<Self>, frame: Frame) {
        if let Some(id) = frame.message_id.clone() {
            if frame.message_type == ABORT_MESSAGE_TYPE {
                debug!(target_id = ?frame.abort_target(), "ignoring remote abort");
                return;
            }
            if self.router.local_handler(&frame.message_type).is_some() {
                self.answer_reverse_request(id, frame);
                return;
            }
        }

        if self.subscriptions.count(&frame.message_type) == 0 {
            debug!(message_type = %frame.message_type, "push event had no subscribers");
            return;
        }
        match self.push_tx.try_send(PushEvent::from_frame(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(message_type = %event.message_type, "push queue full, event dropped");
            }
            Err(TrySendError::Closed(_)) => debug!("push worker stopped, event dropped"),
        }
    }

    /// Run the local handler for a request initiated by the remote side and
    /// reply with the same type and id
    fn answer_reverse_request(self: &Arc<Self>, id: MessageId, frame: Frame) {
        let Some(handler) = self.router.local_handler(&frame.message_type) else {
            return;
        };
        let inner = Arc::downgrade(self);
        tokio::spawn(async move {
            let Frame {
                message_type, data, ..
            } = frame;
            let data = match run_local(handler.as_ref(), &message_type, data).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(message_type = %message_type, error = %e, "reverse request failed");
                    json!({ "error": e.to_string() })
                }
            };
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let reply = Frame::new(message_type, data).with_id(id);
            if let Err(e) = inner.send_frame(&reply) {
                warn!(error = %e, "reverse request reply not sent");
            }
        });
    }
}
