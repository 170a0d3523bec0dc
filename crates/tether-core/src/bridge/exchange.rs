//! Caller-side handles for open exchanges
//!
//! Both handles send their request lazily on first poll and abort the
//! exchange when dropped before it finished, so a closed view never leaves
//! the assistant producing for nobody.

use super::BridgeInner;
use crate::correlation::{StreamEnd, StreamState};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Frame, MessageId};
use crate::router::Interceptor;
use futures::Stream;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, ready};
use tokio::sync::mpsc;
use tokio_util::sync::WaitForCancellationFutureOwned;

/// Aborts the exchange on drop unless disarmed
pub(crate) struct ExchangeGuard {
    inner: Weak<BridgeInner>,
    id: MessageId,
    armed: bool,
}

impl ExchangeGuard {
    pub(crate) fn new(inner: Weak<BridgeInner>, id: MessageId) -> Self {
        Self {
            inner,
            id,
            armed: true,
        }
    }

    fn detached(id: MessageId) -> Self {
        Self {
            inner: Weak::new(),
            id,
            armed: false,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn fire(&mut self) {
        if self.armed {
            self.armed = false;
            if let Some(inner) = self.inner.upgrade() {
                inner.abort_exchange(&self.id, "consumer stopped");
            }
        }
    }
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Reply to a `request`, resolved with the reply frame
///
/// Resolves with `Timeout`, `Cancelled` or `ChannelClosed` when the exchange
/// ends without a reply.
#[must_use = "a request is only sent once its reply is awaited"]
pub struct PendingReply {
    id: MessageId,
    future: BoxFuture<'static, BridgeResult<Frame>>,
    guard: ExchangeGuard,
}

impl PendingReply {
    pub(crate) fn new(
        id: MessageId,
        future: BoxFuture<'static, BridgeResult<Frame>>,
        guard: ExchangeGuard,
    ) -> Self {
        Self { id, future, guard }
    }

    pub(crate) fn failed(id: MessageId, error: BridgeError) -> Self {
        Self {
            guard: ExchangeGuard::detached(id.clone()),
            id,
            future: Box::pin(async move { Err(error) }),
        }
    }

    /// Correlation id of this exchange
    pub fn id(&self) -> &MessageId {
        &self.id
    }
}

impl Future for PendingReply {
    type Output = BridgeResult<Frame>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let output = ready!(self.future.as_mut().poll(cx));
        self.guard.disarm();
        Poll::Ready(output)
    }
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply").field("id", &self.id).finish()
    }
}

/// Lazy, forward-only sequence of stream chunks
///
/// Yields each chunk frame in arrival order and ends after the terminal
/// marker. If the exchange is aborted, the channel is lost or the consumer
/// falls a full queue behind, yields one error and then ends; chunks still
/// buffered at that point are discarded.
#[must_use = "streams do nothing unless polled"]
pub struct ChunkStream {
    id: MessageId,
    message_type: String,
    starter: Option<BoxFuture<'static, BridgeResult<()>>>,
    pending_error: Option<BridgeError>,
    rx: mpsc::Receiver<Frame>,
    state: Arc<StreamState>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    interceptor: Option<Arc<dyn Interceptor>>,
    end: Option<StreamEnd>,
    finished: bool,
    guard: ExchangeGuard,
}

impl ChunkStream {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: MessageId,
        message_type: String,
        starter: BoxFuture<'static, BridgeResult<()>>,
        rx: mpsc::Receiver<Frame>,
        state: Arc<StreamState>,
        interceptor: Option<Arc<dyn Interceptor>>,
        guard: ExchangeGuard,
    ) -> Self {
        let cancelled = Box::pin(state.token().clone().cancelled_owned());
        Self {
            id,
            message_type,
            starter: Some(starter),
            pending_error: None,
            rx,
            state,
            cancelled,
            interceptor,
            end: None,
            finished: false,
            guard,
        }
    }

    pub(crate) fn failed(id: MessageId, message_type: String, error: BridgeError) -> Self {
        let (_tx, rx) = mpsc::channel(1);
        let state = Arc::new(StreamState::new());
        let cancelled = Box::pin(state.token().clone().cancelled_owned());
        Self {
            guard: ExchangeGuard::detached(id.clone()),
            id,
            message_type,
            starter: None,
            pending_error: Some(error),
            rx,
            state,
            cancelled,
            interceptor: None,
            end: None,
            finished: false,
        }
    }

    /// Correlation id of this exchange
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Trailing payload of the terminal marker, once the stream ended normally
    pub fn completion(&self) -> Option<&Value> {
        self.end.as_ref().and_then(|end| end.completion.as_ref())
    }

    /// The terminal frame as received, once the stream ended normally
    pub fn terminal_frame(&self) -> Option<&Frame> {
        self.end.as_ref().map(|end| &end.frame)
    }

    /// Whether the stream has ended
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.guard.disarm();
    }

    fn fail_closed(&mut self) -> Poll<Option<BridgeResult<Frame>>> {
        let error = self
            .state
            .outcome()
            .unwrap_or_else(BridgeError::channel_closed);
        self.finish();
        Poll::Ready(Some(Err(error)))
    }

    fn map_chunk(&mut self, mut frame: Frame) -> BridgeResult<Frame> {
        if let Some(interceptor) = &self.interceptor {
            let data = std::mem::take(&mut frame.data);
            frame.data = interceptor.after_reply(&self.message_type, data)?;
        }
        Ok(frame)
    }
}

impl Stream for ChunkStream {
    type Item = BridgeResult<Frame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if let Some(error) = this.pending_error.take() {
            this.finish();
            return Poll::Ready(Some(Err(error)));
        }

        if let Some(starter) = this.starter.as_mut() {
            match starter.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(error)) => {
                    this.starter = None;
                    this.finish();
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(Ok(())) => this.starter = None,
            }
        }

        if this.state.is_closed() {
            return this.fail_closed();
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(frame)) => match this.map_chunk(frame) {
                Ok(frame) => Poll::Ready(Some(Ok(frame))),
                Err(error) => {
                    this.guard.fire();
                    this.finish();
                    Poll::Ready(Some(Err(error)))
                }
            },
            Poll::Ready(None) => match this.state.take_end() {
                Some(end) => {
                    this.end = Some(end);
                    this.finish();
                    Poll::Ready(None)
                }
                None => this.fail_closed(),
            },
            Poll::Pending => {
                if this.cancelled.as_mut().poll(cx).is_ready() {
                    return this.fail_closed();
                }
                Poll::Pending
            }
        }
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("id", &self.id)
            .field("message_type", &self.message_type)
            .field("finished", &self.finished)
            .finish()
    }
}
