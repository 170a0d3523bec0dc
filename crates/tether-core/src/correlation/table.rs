//! Correlation table

use super::exchange::{ClosedExchange, Entry, ExchangeKind, Feed, Slot, StreamEnd, StreamState};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Frame, MessageId, TerminationStyle};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default number of closed ids remembered for late-reply detection
pub const DEFAULT_CLOSED_ID_MEMORY: usize = 1024;

/// Outcome of matching an inbound frame against the table
#[derive(Debug)]
pub enum Inbound {
    /// A single exchange was resolved or a stream ended
    Resolved,
    /// A stream chunk must be delivered
    Feed(Feed),
    /// The id belonged to an exchange that already closed
    Late(Frame),
    /// No exchange owns this frame
    Unmatched(Frame),
}

/// Mapping from message id to pending exchange
///
/// Not thread-safe on its own; the bridge keeps it behind a mutex that is
/// never held across an await point.
pub struct CorrelationTable {
    entries: HashMap<MessageId, Entry>,
    next_seq: u64,
    recently_closed: LruCache<MessageId, ()>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new(DEFAULT_CLOSED_ID_MEMORY)
    }
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.entries.len())
            .field("recently_closed", &self.recently_closed.len())
            .finish()
    }
}

impl CorrelationTable {
    /// Create a table remembering up to `closed_id_memory` closed ids
    pub fn new(closed_id_memory: usize) -> Self {
        let capacity = NonZeroUsize::new(closed_id_memory).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: HashMap::new(),
            next_seq: 0,
            recently_closed: LruCache::new(capacity),
        }
    }

    fn insert(
        &mut self,
        id: &MessageId,
        message_type: &str,
        remote: bool,
        slot: Slot,
    ) -> BridgeResult<()> {
        if self.entries.contains_key(id) {
            return Err(BridgeError::duplicate_id(id.as_str()));
        }
        self.recently_closed.pop(id);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            id.clone(),
            Entry {
                seq,
                message_type: message_type.to_string(),
                remote,
                sent: false,
                slot,
            },
        );
        Ok(())
    }

    /// Record a pending single exchange
    pub fn register_single(
        &mut self,
        id: &MessageId,
        message_type: &str,
        remote: bool,
    ) -> BridgeResult<oneshot::Receiver<BridgeResult<Frame>>> {
        let (tx, rx) = oneshot::channel();
        self.insert(id, message_type, remote, Slot::Single(tx))?;
        debug!(id = %id, message_type, "registered single exchange");
        Ok(rx)
    }

    /// Record a pending streaming exchange with a bounded chunk queue
    pub fn register_streaming(
        &mut self,
        id: &MessageId,
        message_type: &str,
        remote: bool,
        style: TerminationStyle,
        buffer: usize,
    ) -> BridgeResult<(mpsc::Receiver<Frame>, Arc<StreamState>)> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let state = Arc::new(StreamState::new());
        self.insert(
            id,
            message_type,
            remote,
            Slot::Streaming {
                tx,
                state: state.clone(),
                style,
            },
        )?;
        debug!(id = %id, message_type, "registered streaming exchange");
        Ok((rx, state))
    }

    /// Note that the request frame for `id` went out. False if the entry is gone.
    pub fn mark_sent(&mut self, id: &MessageId) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.sent = true;
                true
            }
            None => false,
        }
    }

    fn close(&mut self, id: &MessageId) -> Option<Entry> {
        let entry = self.entries.remove(id)?;
        self.recently_closed.put(id.clone(), ());
        Some(entry)
    }

    /// Complete a single exchange with `reply`. Unknown ids are a logged no-op.
    pub fn resolve(&mut self, id: &MessageId, reply: Frame) -> bool {
        if !matches!(
            self.entries.get(id).map(|e| e.slot.kind()),
            Some(ExchangeKind::Single)
        ) {
            debug!(id = %id, "resolve for unknown id ignored");
            return false;
        }
        match self.close(id).map(|e| e.slot) {
            Some(Slot::Single(tx)) => {
                let _ = tx.send(Ok(reply));
                true
            }
            _ => false,
        }
    }

    /// Append a chunk to a streaming exchange; a terminal chunk closes it.
    ///
    /// Returns the delivery to perform outside the lock. `None` when the id
    /// is unknown or the chunk was terminal: the end is recorded on the
    /// stream state and the queue sender is dropped, so the consumer sees
    /// the buffered chunks and then the end.
    pub fn feed(&mut self, id: &MessageId, chunk: Frame, is_terminal: bool) -> Option<Feed> {
        let Some(entry) = self.entries.get(id) else {
            debug!(id = %id, "feed for unknown id dropped");
            return None;
        };
        let Slot::Streaming { tx, state, style } = &entry.slot else {
            debug!(id = %id, "feed for non-streaming exchange dropped");
            return None;
        };

        if !is_terminal {
            return Some(Feed {
                id: id.clone(),
                tx: tx.clone(),
                state: state.clone(),
                chunk,
            });
        }

        let completion = style.completion(&chunk);
        if let Some(Slot::Streaming { state, .. }) = self.close(id).map(|e| e.slot) {
            state.finish(StreamEnd {
                frame: chunk,
                completion,
            });
        }
        None
    }

    /// Match an inbound frame that carries a message id
    pub fn accept(&mut self, frame: Frame) -> Inbound {
        let Some(id) = frame.message_id.clone() else {
            return Inbound::Unmatched(frame);
        };

        let terminal = match self.entries.get(&id).map(|e| &e.slot) {
            Some(Slot::Single(_)) => None,
            Some(Slot::Streaming { style, .. }) => Some(style.is_terminal(&frame)),
            None if self.recently_closed.contains(&id) => {
                warn!(id = %id, message_type = %frame.message_type, "late or duplicate reply dropped");
                return Inbound::Late(frame);
            }
            None => return Inbound::Unmatched(frame),
        };

        let Some(terminal) = terminal else {
            self.resolve(&id, frame);
            return Inbound::Resolved;
        };

        match self.feed(&id, frame, terminal) {
            Some(feed) => Inbound::Feed(feed),
            None => Inbound::Resolved,
        }
    }

    /// Remove `id` and complete it with `Cancelled`
    pub fn abort(&mut self, id: &MessageId) -> Option<ClosedExchange> {
        self.close_with(id, BridgeError::Cancelled)
    }

    /// Remove `id` and complete it with `outcome`
    pub fn close_with(&mut self, id: &MessageId, outcome: BridgeError) -> Option<ClosedExchange> {
        let entry = self.close(id)?;
        let closed = ClosedExchange {
            message_type: entry.message_type,
            kind: entry.slot.kind(),
            remote: entry.remote,
            sent: entry.sent,
        };
        debug!(id = %id, outcome = %outcome, "exchange closed early");
        entry.slot.fail(outcome);
        Some(closed)
    }

    /// Complete every open entry with `reason`, oldest first
    pub fn reject_all(&mut self, reason: BridgeError) -> Vec<MessageId> {
        let ids = self.ids();
        for id in &ids {
            if let Some(entry) = self.close(id) {
                entry.slot.fail(reason.clone());
            }
        }
        if !ids.is_empty() {
            warn!(count = ids.len(), reason = %reason, "rejected all pending exchanges");
        }
        ids
    }

    /// Open ids in registration order
    pub fn ids(&self) -> Vec<MessageId> {
        let mut open: Vec<_> = self.entries.iter().map(|(id, e)| (e.seq, id.clone())).collect();
        open.sort_by_key(|(seq, _)| *seq);
        open.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of open entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are open
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is open
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.contains_key(id)
    }

    /// Whether `id` closed recently
    pub fn is_recently_closed(&self, id: &MessageId) -> bool {
        self.recently_closed.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::Delivery;
    use serde_json::json;

    fn id(s: &str) -> MessageId {
        MessageId::from(s)
    }

    fn reply(s: &str, data: serde_json::Value) -> Frame {
        Frame::new("llm/complete", data).with_id(s)
    }

    #[tokio::test]
    async fn test_resolve_single() {
        let mut table = CorrelationTable::default();
        let rx = table.register_single(&id("abc"), "llm/complete", true).unwrap();
        assert!(table.resolve(&id("abc"), reply("abc", json!({"text": "hello"}))));
        assert!(table.is_empty());

        let frame = rx.await.unwrap().unwrap();
        assert_eq!(frame.id_str(), Some("abc"));
        assert_eq!(frame.data, json!({"text": "hello"}));
    }

    #[test]
    fn test_resolve_unknown_is_noop() {
        let mut table = CorrelationTable::default();
        assert!(!table.resolve(&id("nope"), reply("nope", json!(null))));
        assert!(table.feed(&id("nope"), reply("nope", json!(null)), false).is_none());
    }

    #[test]
    fn test_duplicate_registration_fails_fast() {
        let mut table = CorrelationTable::default();
        let _rx = table.register_single(&id("a"), "t", true).unwrap();
        let err = table
            .register_streaming(&id("a"), "t", true, TerminationStyle::DoneField, 4)
            .unwrap_err();
        assert_eq!(err, BridgeError::duplicate_id("a"));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_abort_single() {
        let mut table = CorrelationTable::default();
        let rx = table.register_single(&id("a"), "llm/complete", true).unwrap();
        table.mark_sent(&id("a"));

        let closed = table.abort(&id("a")).unwrap();
        assert!(closed.needs_remote_abort());
        assert_eq!(closed.kind, ExchangeKind::Single);
        assert!(table.is_empty());
        assert_eq!(rx.await.unwrap(), Err(BridgeError::Cancelled));
        assert!(table.abort(&id("a")).is_none());
    }

    #[test]
    fn test_unsent_exchange_needs_no_remote_abort() {
        let mut table = CorrelationTable::default();
        let _rx = table.register_single(&id("a"), "t", true).unwrap();
        assert!(!table.abort(&id("a")).unwrap().needs_remote_abort());
    }

    #[tokio::test]
    async fn test_feed_preserves_order_and_closes_once() {
        let mut table = CorrelationTable::default();
        let (mut rx, state) = table
            .register_streaming(&id("s"), "llm/streamChat", true, TerminationStyle::DoneField, 8)
            .unwrap();

        for part in ["He", "llo"] {
            let feed = table.feed(&id("s"), reply("s", json!(part)), false).unwrap();
            assert_eq!(feed.try_deliver(), Delivery::Delivered);
        }
        let terminal = reply("s", json!({"done": true, "usage": {"tokens": 2}}));
        assert!(table.feed(&id("s"), terminal.clone(), true).is_none());
        assert!(table.is_empty());

        let mut seen = Vec::new();
        while let Some(chunk) = rx.recv().await {
            seen.push(chunk.data);
        }
        assert_eq!(seen, vec![json!("He"), json!("llo")]);

        let end = state.take_end().unwrap();
        assert_eq!(end.frame, terminal);
        assert_eq!(end.completion, None);
        assert!(state.take_end().is_none());
        assert!(!state.is_closed());
    }

    #[tokio::test]
    async fn test_accept_routes_by_kind() {
        let mut table = CorrelationTable::default();
        let single = table.register_single(&id("a"), "llm/complete", true).unwrap();
        let (_rx, state) = table
            .register_streaming(&id("b"), "llm/streamChat", true, TerminationStyle::DoneField, 8)
            .unwrap();

        assert!(matches!(table.accept(reply("a", json!({}))), Inbound::Resolved));
        assert!(single.await.unwrap().is_ok());
        assert!(matches!(
            table.accept(reply("b", json!({"content": "x"}))),
            Inbound::Feed(Feed { .. })
        ));
        assert!(matches!(
            table.accept(reply("b", json!({"done": true, "content": 7}))),
            Inbound::Resolved
        ));
        assert_eq!(state.take_end().unwrap().completion, Some(json!(7)));
        assert!(matches!(table.accept(reply("a", json!({}))), Inbound::Late(_)));
        assert!(matches!(table.accept(reply("zzz", json!({}))), Inbound::Unmatched(_)));
        assert!(matches!(
            table.accept(Frame::new("indexProgress", json!({}))),
            Inbound::Unmatched(_)
        ));
    }

    #[tokio::test]
    async fn test_reject_all_oldest_first() {
        let mut table = CorrelationTable::default();
        let names = ["z", "m", "a", "q"];
        let mut receivers = Vec::new();
        for name in names {
            receivers.push(table.register_single(&id(name), "t", true).unwrap());
        }
        let (_srx, state) = table
            .register_streaming(&id("s"), "t", true, TerminationStyle::DoneField, 1)
            .unwrap();

        let order = table.reject_all(BridgeError::channel_closed());
        let expected: Vec<_> = names.iter().map(|n| id(n)).chain([id("s")]).collect();
        assert_eq!(order, expected);
        assert!(table.is_empty());

        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Err(BridgeError::channel_closed()));
        }
        assert_eq!(state.outcome(), Some(BridgeError::channel_closed()));
    }

    #[test]
    fn test_full_queue_is_reported_without_waiting() {
        let mut table = CorrelationTable::default();
        let (_rx, _state) = table
            .register_streaming(&id("s"), "t", true, TerminationStyle::DoneField, 1)
            .unwrap();
        let first = table.feed(&id("s"), reply("s", json!(1)), false).unwrap();
        assert_eq!(first.try_deliver(), Delivery::Delivered);

        let second = table.feed(&id("s"), reply("s", json!(2)), false).unwrap();
        assert_eq!(second.try_deliver(), Delivery::Full);

        let third = table.feed(&id("s"), reply("s", json!(3)), false).unwrap();
        table.abort(&id("s"));
        assert_eq!(third.try_deliver(), Delivery::Closed);
    }

    #[test]
    fn test_terminal_frame_needs_no_queue_space() {
        let mut table = CorrelationTable::default();
        let (_rx, state) = table
            .register_streaming(&id("s"), "t", true, TerminationStyle::DoneField, 1)
            .unwrap();
        let chunk = table.feed(&id("s"), reply("s", json!(1)), false).unwrap();
        assert_eq!(chunk.try_deliver(), Delivery::Delivered);

        assert!(table.feed(&id("s"), reply("s", json!({"done": true})), true).is_none());
        assert!(state.take_end().is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn test_closed_id_memory_is_bounded() {
        let mut table = CorrelationTable::new(2);
        for name in ["a", "b", "c"] {
            let _rx = table.register_single(&id(name), "t", true).unwrap();
            table.abort(&id(name));
        }
        assert!(!table.is_recently_closed(&id("a")));
        assert!(table.is_recently_closed(&id("c")));
    }

    #[test]
    fn test_reregistering_closed_id_clears_late_marker() {
        let mut table = CorrelationTable::default();
        let _rx = table.register_single(&id("a"), "t", true).unwrap();
        table.abort(&id("a"));
        let _rx = table.register_single(&id("a"), "t", true).unwrap();
        assert!(!table.is_recently_closed(&id("a")));
    }
}
