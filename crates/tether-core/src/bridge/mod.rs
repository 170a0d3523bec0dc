//! Bridge facade
//!
//! [`Bridge`] is the only surface UI and command code talks to. One bridge
//! instance serves one logical connection; clone the handle to share it.
//!
//! ```no_run
//! # async fn demo() -> tether_core::BridgeResult<()> {
//! use std::sync::Arc;
//! use tether_core::{Bridge, BridgeConfig, WebSocketTransport};
//! use serde_json::json;
//!
//! let config = BridgeConfig::default().with_url("ws://localhost:3000");
//! let transport = Arc::new(WebSocketTransport::new("ws://localhost:3000"));
//! let bridge = Bridge::connect(config, transport).await?;
//!
//! let reply = bridge.request("llm/complete", json!({"prompt": "hi"})).await?;
//! println!("{}", reply.data);
//! # Ok(())
//! # }
//! ```

mod dispatcher;
pub mod events;
pub mod exchange;
pub mod options;
pub mod session;


pub use events::BridgeEvent;
pub use exchange::{ChunkStream, PendingReply};
pub use options::RequestOptions;
pub use session::Session;

use crate::config::BridgeConfig;
use crate::correlation::CorrelationTable;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Frame, Framer, MessageId, MessageIdGenerator};
use crate::router::{Interceptor, LocalHandler, Route, Router};
use crate::subscriptions::{
    EventHandler, FnHandler, PushEvent, Subscription, SubscriptionRegistry, TypedHandler,
};
use crate::transport::{self, ChannelTransport};
use exchange::ExchangeGuard;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OnceCell, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, info, instrument, warn};

/// Capacity of the lifecycle event broadcast
const EVENT_CAPACITY: usize = 64;

/// Push events queued for subscribers before new ones are dropped
const PUSH_QUEUE_CAPACITY: usize = 256;

pub(crate) struct BridgeInner {
    config: BridgeConfig,
    transport: Arc<dyn ChannelTransport>,
    framer: Framer,
    ids: MessageIdGenerator,
    table: Mutex<CorrelationTable>,
    router: Router,
    subscriptions: Arc<SubscriptionRegistry>,
    push_tx: mpsc::Sender<PushEvent>,
    events: broadcast::Sender<BridgeEvent>,
    session: OnceCell<Session>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    push_worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl BridgeInner {
    fn emit(&self, event: BridgeEvent) {
        let _ = self.events.send(event);
    }

    fn send_frame(&self, frame: &Frame) -> BridgeResult<()> {
        let text = self.framer.encode(frame)?;
        self.transport.send(text)
    }

    /// Remove `id` and, when the remote side was already asked, tell it to stop
    pub(crate) fn abort_exchange(&self, id: &MessageId, why: &str) -> bool {
        self.close_exchange(id, BridgeError::Cancelled, why)
    }

    /// Close `id` with `outcome` and send the remote abort if it was sent
    fn close_exchange(&self, id: &MessageId, outcome: BridgeError, why: &str) -> bool {
        let closed = self.table.lock().close_with(id, outcome);
        let Some(closed) = closed else {
            return false;
        };
        debug!(id = %id, message_type = %closed.message_type, why, "exchange closed");
        if closed.needs_remote_abort() {
            let frame = Frame::abort(id, self.ids.next_id());
            if let Err(e) = self.send_frame(&frame) {
                debug!(id = %id, error = %e, "abort frame not sent");
            }
        }
        true
    }

    /// Send `frame` unless `id` was closed in the meantime
    fn send_if_open(&self, id: &MessageId, frame: Frame) -> BridgeResult<()> {
        let mut table = self.table.lock();
        if !table.mark_sent(id) {
            return Ok(());
        }
        self.send_frame(&frame)
    }

    /// Send the request frame for `id`, or start its local handler.
    ///
    /// Any failure closes the table entry with the same error.
    async fn start(
        self: &Arc<Self>,
        id: &MessageId,
        message_type: &str,
        data: Value,
        route: &Route,
    ) -> BridgeResult<()> {
        let result = self.start_inner(id, message_type, data, route).await;
        if let Err(e) = &result {
            self.table.lock().close_with(id, e.clone());
        }
        result
    }

    async fn start_inner(
        self: &Arc<Self>,
        id: &MessageId,
        message_type: &str,
        data: Value,
        route: &Route,
    ) -> BridgeResult<()> {
        match route {
            Route::Local(handler) => {
                if !self.table.lock().mark_sent(id) {
                    return Ok(());
                }
                let inner = Arc::downgrade(self);
                let handler = handler.clone();
                let (id, message_type) = (id.clone(), message_type.to_string());
                tokio::spawn(async move {
                    let result = run_local(handler.as_ref(), &message_type, data).await;
                    if let Some(inner) = inner.upgrade() {
                        inner.complete_local(&id, &message_type, result);
                    }
                });
                Ok(())
            }
            Route::Remote | Route::Intercepted(_) => {
                let data = match route {
                    Route::Intercepted(interceptor) => {
                        interceptor.before_send(message_type, data).await?
                    }
                    _ => data,
                };
                self.send_if_open(id, Frame::new(message_type, data).with_id(id.clone()))
            }
        }
    }

    /// Deliver a local handler's result as if it were a reply
    fn complete_local(&self, id: &MessageId, message_type: &str, result: BridgeResult<Value>) {
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                self.table.lock().close_with(id, e);
                return;
            }
        };
        let reply = Frame::new(message_type, value).with_id(id.clone());
        let mut table = self.table.lock();
        if table.resolve(id, reply.clone()) {
            return;
        }
        if let Some(feed) = table.feed(id, reply, false) {
            feed.try_deliver();
        }
        let end = Frame::new(message_type, json!({"done": true})).with_id(id.clone());
        table.feed(id, end, true);
    }

    fn start_single(
        self: &Arc<Self>,
        id: MessageId,
        message_type: String,
        data: Value,
        route: Route,
        timeout: std::time::Duration,
    ) -> PendingReply {
        let remote = route.decision().is_remote();
        let rx = match self.table.lock().register_single(&id, &message_type, remote) {
            Ok(rx) => rx,
            Err(e) => return PendingReply::failed(id, e),
        };
        let guard = ExchangeGuard::new(Arc::downgrade(self), id.clone());
        let span = debug_span!("request", message_type = %message_type, id = %id, route = %route.decision());

        let inner = self.clone();
        let reply_id = id.clone();
        let future = async move {
            let id = reply_id;
            inner.start(&id, &message_type, data, &route).await?;
            let mut reply = match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result?,
                Ok(Err(_)) => return Err(BridgeError::channel_closed()),
                Err(_) => {
                    let error = BridgeError::timeout(timeout);
                    if inner.table.lock().close_with(&id, error.clone()).is_some() {
                        warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
                        inner.abort_remote_after_timeout(&id, &route);
                    }
                    return Err(error);
                }
            };
            if let Some(interceptor) = route.interceptor() {
                reply.data = interceptor.after_reply(&message_type, std::mem::take(&mut reply.data))?;
            }
            debug!("request resolved");
            Ok(reply)
        }
        .instrument(span);

        PendingReply::new(id, Box::pin(future), guard)
    }

    fn abort_remote_after_timeout(&self, id: &MessageId, route: &Route) {
        if route.decision().is_remote() {
            let frame = Frame::abort(id, self.ids.next_id());
            if let Err(e) = self.send_frame(&frame) {
                debug!(id = %id, error = %e, "abort frame not sent");
            }
        }
    }

    fn start_stream(
        self: &Arc<Self>,
        id: MessageId,
        message_type: String,
        data: Value,
        route: Route,
    ) -> ChunkStream {
        let remote = route.decision().is_remote();
        let style = self.config.termination.style_for(&message_type).clone();
        let registered = self.table.lock().register_streaming(
            &id,
            &message_type,
            remote,
            style,
            self.config.stream_buffer,
        );
        let (rx, state) = match registered {
            Ok(pair) => pair,
            Err(e) => return ChunkStream::failed(id, message_type, e),
        };
        let guard = ExchangeGuard::new(Arc::downgrade(self), id.clone());
        let span = debug_span!("stream", message_type = %message_type, id = %id, route = %route.decision());

        let inner = self.clone();
        let start_id = id.clone();
        let start_type = message_type.clone();
        let interceptor = route.interceptor();
        let starter = async move { inner.start(&start_id, &start_type, data, &route).await }
            .instrument(span);

        ChunkStream::new(
            id,
            message_type,
            Box::pin(starter),
            rx,
            state,
            interceptor,
            guard,
        )
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.push_worker.get_mut().take() {
            handle.abort();
        }
    }
}

/// Run push subscribers one event at a time, in arrival order
async fn run_push_worker(registry: Arc<SubscriptionRegistry>, mut rx: mpsc::Receiver<PushEvent>) {
    while let Some(event) = rx.recv().await {
        registry.dispatch(event).await;
    }
    debug!("push worker stopped");
}

async fn run_local(handler: &dyn LocalHandler, message_type: &str, data: Value) -> BridgeResult<Value> {
    match AssertUnwindSafe(handler.handle(data)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            warn!(message_type, "local handler panicked");
            Err(BridgeError::handler(message_type, "handler panicked"))
        }
    }
}

/// Message bus between an editor surface and the assistant service
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("transport", &self.inner.transport.name())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Bridge {
    /// Connect `transport`, start the dispatcher and perform the session handshake
    #[instrument(skip_all, fields(transport = transport.name()))]
    pub async fn connect(config: BridgeConfig, transport: Arc<dyn ChannelTransport>) -> BridgeResult<Self> {
        config.validate_bridge()?;
        let events_rx = transport.connect().await?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (push_tx, push_rx) = mpsc::channel(PUSH_QUEUE_CAPACITY);
        let subscriptions = SubscriptionRegistry::new();
        let push_worker = tokio::spawn(run_push_worker(subscriptions.clone(), push_rx));
        let inner = Arc::new(BridgeInner {
            router: Router::from_config(&config.routing),
            table: Mutex::new(CorrelationTable::new(config.closed_id_memory)),
            ids: MessageIdGenerator::new(config.id_strategy),
            framer: Framer::new(),
            subscriptions,
            push_tx,
            events,
            session: OnceCell::new(),
            dispatcher: Mutex::new(None),
            push_worker: Mutex::new(Some(push_worker)),
            closed: AtomicBool::new(false),
            transport,
            config,
        });

        let handle = tokio::spawn(dispatcher::run(Arc::downgrade(&inner), events_rx));
        *inner.dispatcher.lock() = Some(handle);

        let bridge = Self { inner };
        bridge.handshake().await;
        info!("bridge connected");
        Ok(bridge)
    }

    /// Build the configured transport and connect it
    pub async fn from_config(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        let transport = transport::from_config(&config.transport)?;
        Self::connect(config, transport).await
    }

    async fn handshake(&self) {
        let Some(message_type) = self.inner.config.session.handshake_type.clone() else {
            return;
        };
        let id = self.inner.ids.next_id();
        let timeout = self.inner.config.session.handshake_timeout;
        let reply = self
            .inner
            .start_single(id, message_type.clone(), Value::Null, Route::Remote, timeout)
            .await;
        match reply {
            Ok(frame) => {
                let _ = self.inner.session.set(Session::new(frame.data));
                debug!(message_type = %message_type, "session established");
            }
            Err(e) => warn!(message_type = %message_type, error = %e, "session handshake failed"),
        }
    }

    /// Fire-and-forget notification
    ///
    /// Returns once the transport accepted the frame. Unroutable types are
    /// dropped with a warning.
    #[instrument(skip(self, data))]
    pub async fn post(&self, message_type: &str, data: Value) -> BridgeResult<()> {
        let route = match self.inner.router.route(message_type) {
            Ok(route) => route,
            Err(e) => {
                warn!(error = %e, "dropping post with no route");
                return Ok(());
            }
        };
        match route {
            Route::Local(handler) => {
                let message_type = message_type.to_string();
                tokio::spawn(async move {
                    if let Err(e) = run_local(handler.as_ref(), &message_type, data).await {
                        warn!(message_type = %message_type, error = %e, "local post handler failed");
                    }
                });
                Ok(())
            }
            Route::Remote => self.inner.send_frame(&Frame::new(message_type, data)),
            Route::Intercepted(interceptor) => {
                let data = interceptor.before_send(message_type, data).await?;
                self.inner.send_frame(&Frame::new(message_type, data))
            }
        }
    }

    /// Request with a single reply
    pub fn request(&self, message_type: &str, data: Value) -> PendingReply {
        self.request_with(message_type, data, RequestOptions::default())
    }

    /// Request with a single reply and explicit options
    pub fn request_with(&self, message_type: &str, data: Value, options: RequestOptions) -> PendingReply {
        let id = options.message_id.unwrap_or_else(|| self.inner.ids.next_id());
        let timeout = options.timeout.unwrap_or(self.inner.config.request_timeout);
        match self.inner.router.route(message_type) {
            Ok(route) => self
                .inner
                .start_single(id, message_type.to_string(), data, route, timeout),
            Err(e) => {
                warn!(message_type, error = %e, "request has no route");
                PendingReply::failed(id, e)
            }
        }
    }

    /// Request with a streamed reply
    pub fn stream(&self, message_type: &str, data: Value) -> ChunkStream {
        self.stream_with(message_type, data, RequestOptions::default())
    }

    /// Request with a streamed reply and explicit options
    pub fn stream_with(&self, message_type: &str, data: Value, options: RequestOptions) -> ChunkStream {
        let id = options.message_id.unwrap_or_else(|| self.inner.ids.next_id());
        match self.inner.router.route(message_type) {
            Ok(route) => self
                .inner
                .start_stream(id, message_type.to_string(), data, route),
            Err(e) => {
                warn!(message_type, error = %e, "stream has no route");
                ChunkStream::failed(id, message_type.to_string(), e)
            }
        }
    }

    /// Abort an open exchange. Returns false if `id` is not open.
    pub fn abort(&self, id: &MessageId) -> bool {
        self.inner.abort_exchange(id, "caller abort")
    }

    /// Subscribe to push events of `message_type`
    pub fn on<H>(&self, message_type: &str, handler: H) -> Subscription
    where
        H: EventHandler + 'static,
    {
        self.inner.subscriptions.subscribe(message_type, Arc::new(handler))
    }

    /// Subscribe a synchronous closure
    pub fn on_fn<F>(&self, message_type: &str, f: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.on(message_type, FnHandler::new(f))
    }

    /// Subscribe with a typed payload decoder
    pub fn on_typed<T, F, Fut>(&self, message_type: &str, f: F) -> Subscription
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<()>> + Send + 'static,
    {
        self.on(message_type, TypedHandler::new(f))
    }

    /// Register a host-side handler; also answers reverse requests of that type
    pub fn register_local(&self, message_type: &str, handler: Arc<dyn LocalHandler>) -> BridgeResult<()> {
        self.inner.router.register_local(message_type, handler)
    }

    /// Register an async closure as a host-side handler
    pub fn register_local_fn<F, Fut>(&self, message_type: &str, f: F) -> BridgeResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
    {
        self.inner.router.register_local_fn(message_type, f)
    }

    /// Register an interceptor for a remote-bound type
    pub fn register_interceptor(
        &self,
        message_type: &str,
        interceptor: Arc<dyn Interceptor>,
    ) -> BridgeResult<()> {
        self.inner.router.register_interceptor(message_type, interceptor)
    }

    /// The router
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Subscribe to lifecycle events
    pub fn events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    /// Number of open exchanges
    pub fn pending(&self) -> usize {
        self.inner.table.lock().len()
    }

    /// Session obtained at connect, if the handshake succeeded
    pub fn session(&self) -> Option<&Session> {
        self.inner.session.get()
    }

    /// Fresh message id from this bridge's generator
    pub fn next_id(&self) -> MessageId {
        self.inner.ids.next_id()
    }

    /// Whether the transport can currently send
    pub fn is_connected(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst) && self.inner.transport.is_connected()
    }

    /// Configuration in use
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Close the transport, fail every open exchange and stop dispatching
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.transport.close().await;
        self.inner
            .table
            .lock()
            .reject_all(BridgeError::channel_closed_because("bridge closed"));
        let handles = [
            self.inner.dispatcher.lock().take(),
            self.inner.push_worker.lock().take(),
        ];
        for handle in handles.into_iter().flatten() {
            handle.abort();
        }
        info!("bridge closed");
    }
}
