//! Subscription registry

use super::handlers::EventHandler;
use super::types::PushEvent;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

type HandlerList = Vec<(u64, Arc<dyn EventHandler>)>;

/// Ordered push-event handlers keyed by message type
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, HandlerList>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("types", &self.handlers.read().len())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a handler for `message_type`
    pub fn subscribe(
        self: &Arc<Self>,
        message_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Subscription {
        let message_type = message_type.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(message_type.clone())
            .or_default()
            .push((id, handler));
        debug!(message_type = %message_type, handler_id = id, "subscribed");
        Subscription {
            id,
            message_type,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, message_type: &str, id: u64) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(message_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(message_type);
        }
        removed
    }

    /// Number of handlers for `message_type`
    pub fn count(&self, message_type: &str) -> usize {
        self.handlers.read().get(message_type).map_or(0, Vec::len)
    }

    /// Run every handler for the event's type in registration order.
    ///
    /// Errors and panics are logged and do not stop later handlers. Returns
    /// the number of handlers invoked.
    pub async fn dispatch(&self, event: PushEvent) -> usize {
        let list: HandlerList = self
            .handlers
            .read()
            .get(&event.message_type)
            .cloned()
            .unwrap_or_default();

        if list.is_empty() {
            debug!(message_type = %event.message_type, "no subscribers for push event");
            return 0;
        }

        for (id, handler) in &list {
            let outcome = AssertUnwindSafe(handler.handle(event.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(message_type = %event.message_type, handler_id = id, error = %e, "push handler failed");
                }
                Err(_) => {
                    warn!(message_type = %event.message_type, handler_id = id, "push handler panicked");
                }
            }
        }
        list.len()
    }
}

/// Token that removes exactly one handler
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    message_type: String,
    registry: Weak<SubscriptionRegistry>,
}

impl Subscription {
    /// Remove the handler. Returns false if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.message_type, self.id),
            None => false,
        }
    }

    /// Message type the handler listens to
    pub fn message_type(&self) -> &str {
        &self.message_type
    }
}
