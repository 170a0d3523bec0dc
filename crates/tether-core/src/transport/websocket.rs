//! WebSocket transport
//!
//! Client connection to the assistant service. A background task owns the
//! socket, pumps the bounded outbound queue, and on unexpected loss
//! reconnects with bounded exponential backoff. Frames queued before a loss
//! are discarded, never replayed.

use super::{ChannelTransport, EVENT_QUEUE, TransportEvent, queue_error};
use crate::error::{BridgeError, BridgeResult};
use crate::recovery::{BackoffStrategy, ExponentialBackoff, ReconnectConfig};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default bound of the outbound frame queue
pub const DEFAULT_WS_QUEUE: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client transport with reconnect
pub struct WebSocketTransport {
    url: String,
    send_queue: usize,
    reconnect: ReconnectConfig,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    connected: Arc<AtomicBool>,
    /// Replaced on every `connect`, so a closed transport can be reopened
    shutdown: Mutex<CancellationToken>,
}

impl WebSocketTransport {
    /// Create a transport for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            send_queue: DEFAULT_WS_QUEUE,
            reconnect: ReconnectConfig::default(),
            outbound: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Set the outbound queue bound
    pub fn with_send_queue(mut self, send_queue: usize) -> Self {
        self.send_queue = send_queue.max(1);
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

async fn open(url: &str) -> BridgeResult<WsStream> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| BridgeError::transport(format!("connect to {} failed: {}", url, e)))?;
    Ok(stream)
}

/// Pump one live connection. Returns the loss reason, or `None` on shutdown.
async fn pump(
    stream: WsStream,
    outbound: &mut mpsc::Receiver<String>,
    events: &mpsc::Sender<TransportEvent>,
    shutdown: &CancellationToken,
) -> Option<String> {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return None;
            }
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        return Some(e.to_string());
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return None;
                }
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if events.send(TransportEvent::Frame(text.as_str().to_owned())).await.is_err() {
                        return None;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if events.send(TransportEvent::Frame(text)).await.is_err() {
                            return None;
                        }
                    }
                    Err(_) => warn!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return Some(
                        frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by peer".to_string()),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(e.to_string()),
                None => return Some("stream ended".to_string()),
            },
        }
    }
}

/// Retry until a connection opens, the budget runs out, or shutdown
async fn reopen(
    url: &str,
    backoff: &mut ExponentialBackoff,
    events: &mpsc::Sender<TransportEvent>,
    shutdown: &CancellationToken,
) -> Option<WsStream> {
    loop {
        let Some(delay) = backoff.next_delay() else {
            error!(url, attempts = backoff.attempts(), "giving up on reconnect");
            return None;
        };
        let attempt = backoff.attempts();
        info!(url, attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        if events
            .send(TransportEvent::Reconnecting { attempt, delay })
            .await
            .is_err()
        {
            return None;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
        match open(url).await {
            Ok(stream) => return Some(stream),
            Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
        }
    }
}

async fn run(
    mut stream: WsStream,
    url: String,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
    reconnect: ReconnectConfig,
) {
    let mut backoff = ExponentialBackoff::new(reconnect);
    loop {
        let lost = pump(stream, &mut outbound, &events, &shutdown).await;
        connected.store(false, Ordering::SeqCst);
        let Some(reason) = lost else {
            debug!(url = %url, "websocket transport shut down");
            break;
        };

        warn!(url = %url, reason = %reason, "websocket connection lost");
        let mut discarded = 0usize;
        while outbound.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "discarded frames queued before connection loss");
        }
        if events
            .send(TransportEvent::Disconnected { reason })
            .await
            .is_err()
        {
            return;
        }

        stream = match reopen(&url, &mut backoff, &events, &shutdown).await {
            Some(stream) => stream,
            None => break,
        };
        backoff.reset();
        connected.store(true, Ordering::SeqCst);
        info!(url = %url, "websocket reconnected");
        if events.send(TransportEvent::Connected).await.is_err() {
            return;
        }
    }
    let _ = events.send(TransportEvent::Closed).await;
}

#[async_trait]
impl ChannelTransport for WebSocketTransport {
    async fn connect(&self) -> BridgeResult<mpsc::Receiver<TransportEvent>> {
        if self.outbound.lock().is_some() {
            return Err(BridgeError::transport("websocket transport already connected"));
        }
        let stream = open(&self.url).await?;
        info!(url = %self.url, "websocket connected");

        let (out_tx, out_rx) = mpsc::channel(self.send_queue);
        let (ev_tx, ev_rx) = mpsc::channel(EVENT_QUEUE);
        let shutdown = CancellationToken::new();
        *self.shutdown.lock() = shutdown.clone();
        *self.outbound.lock() = Some(out_tx);
        self.connected.store(true, Ordering::SeqCst);
        let _ = ev_tx.send(TransportEvent::Connected).await;

        tokio::spawn(run(
            stream,
            self.url.clone(),
            out_rx,
            ev_tx,
            self.connected.clone(),
            shutdown,
            self.reconnect.clone(),
        ));
        Ok(ev_rx)
    }

    fn send(&self, text: String) -> BridgeResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BridgeError::channel_closed());
        }
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.try_send(text).map_err(queue_error),
            None => Err(BridgeError::channel_closed()),
        }
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.outbound.lock().take();
        self.shutdown.lock().cancel();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}
