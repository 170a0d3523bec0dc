//! Newline-delimited JSON transport
//!
//! Used as the webview bridge: a host process relays `postMessage` traffic
//! as one JSON frame per line over stdin/stdout. End of input is channel
//! loss; there is nothing to reconnect to.

use super::{ChannelTransport, EVENT_QUEUE, TransportEvent, queue_error};
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Default bound of the outbound line queue
pub const DEFAULT_LINE_QUEUE: usize = 256;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// JSON-lines transport over an async reader/writer pair
pub struct LineTransport {
    name: &'static str,
    io: Mutex<Option<(BoxReader, BoxWriter)>>,
    send_queue: usize,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl LineTransport {
    /// Create a transport over arbitrary streams
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            name: "lines",
            io: Mutex::new(Some((Box::new(reader), Box::new(writer)))),
            send_queue: DEFAULT_LINE_QUEUE,
            outbound: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a transport over the process's stdin and stdout
    pub fn stdio() -> Self {
        let mut transport = Self::new(tokio::io::stdin(), tokio::io::stdout());
        transport.name = "stdio";
        transport
    }

    /// Set the outbound queue bound
    pub fn with_send_queue(mut self, send_queue: usize) -> Self {
        self.send_queue = send_queue.max(1);
        self
    }
}

async fn write_lines(
    mut writer: BoxWriter,
    mut rx: mpsc::Receiver<String>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            error!(error = %e, "line transport write failed");
            connected.store(false, Ordering::SeqCst);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_lines(
    reader: BoxReader,
    events: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = lines.next_line() => next,
        };
        match next {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if events.send(TransportEvent::Frame(line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("line transport reached end of input");
                connected.store(false, Ordering::SeqCst);
                let _ = events
                    .send(TransportEvent::Disconnected {
                        reason: "end of input".to_string(),
                    })
                    .await;
                break;
            }
            Err(e) => {
                error!(error = %e, "line transport read failed");
                connected.store(false, Ordering::SeqCst);
                let _ = events
                    .send(TransportEvent::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                break;
            }
        }
    }
    let _ = events.send(TransportEvent::Closed).await;
}

#[async_trait]
impl ChannelTransport for LineTransport {
    async fn connect(&self) -> BridgeResult<mpsc::Receiver<TransportEvent>> {
        let (reader, writer) = self
            .io
            .lock()
            .take()
            .ok_or_else(|| BridgeError::transport("line transport can only connect once"))?;

        let (out_tx, out_rx) = mpsc::channel(self.send_queue);
        let (ev_tx, ev_rx) = mpsc::channel(EVENT_QUEUE);
        *self.outbound.lock() = Some(out_tx);
        self.connected.store(true, Ordering::SeqCst);

        let _ = ev_tx.send(TransportEvent::Connected).await;
        tokio::spawn(write_lines(
            writer,
            out_rx,
            self.connected.clone(),
            self.shutdown.clone(),
        ));
        tokio::spawn(read_lines(
            reader,
            ev_tx,
            self.connected.clone(),
            self.shutdown.clone(),
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
        self.shutdown.cancel();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
