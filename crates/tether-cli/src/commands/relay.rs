//! `tether relay`: stdio webview bridge
//!
//! A UI surface writes frames to our stdin and reads frames from our stdout,
//! one JSON object per line. Frames with an id become exchanges on the bridge
//! under the UI's own id; replies, chunks and forwarded push events are
//! written back as frames. A UI `abort` aborts the matching exchange.
//!
//! Output to the UI goes through a bounded queue. Replies and stream chunks
//! wait for room; forwarded push events are dropped when it is full.

use super::connect;
use crate::signal_handler::SignalHandler;
use futures::StreamExt;
use serde_json::json;
use tether_core::protocol::ABORT_MESSAGE_TYPE;
use tether_core::{
    Bridge, BridgeConfig, BridgeError, Frame, Framer, MessageId, PushEvent, RequestOptions,
    TransportKind,
};
use tether_sdk::message_types::EDITOR_EVENTS;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Frames waiting to be written to the UI
const OUTPUT_QUEUE_CAPACITY: usize = 256;

pub async fn execute(config: BridgeConfig, forward: Vec<String>) -> anyhow::Result<()> {
    if config.transport.kind == TransportKind::Stdio {
        anyhow::bail!("relay owns stdio for the UI side; configure a websocket transport");
    }
    let forward = if forward.is_empty() {
        EDITOR_EVENTS.iter().map(|t| t.to_string()).collect()
    } else {
        forward
    };

    let bridge = connect(config).await?;
    let signals = SignalHandler::start()?;
    let result = run(
        bridge.clone(),
        tokio::io::stdin(),
        tokio::io::stdout(),
        &forward,
        signals.token(),
    )
    .await;
    bridge.close().await;
    result
}

/// Relay until `input` ends or `shutdown` fires
///
/// Exchanges still open at that point are dropped, which aborts them.
pub async fn run<R, W>(
    bridge: Bridge,
    input: R,
    output: W,
    forward: &[String],
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
    let writer_done = CancellationToken::new();
    let writer = tokio::spawn(write_frames(output, rx, writer_done.clone()));

    let subscriptions: Vec<_> = forward
        .iter()
        .map(|message_type| {
            let tx = tx.clone();
            bridge.on_fn(message_type, move |event| {
                forward_push(&tx, event);
            })
        })
        .collect();

    let framer = Framer::new();
    let mut exchanges = JoinSet::new();
    let mut lines = BufReader::new(input).lines();
    info!(forwarding = forward.len(), "relay started");

    let outcome = loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(anyhow::Error::from(e).context("reading UI frames")),
        };
        if line.trim().is_empty() {
            continue;
        }
        match framer.decode(&line) {
            Ok(frame) => relay_frame(&bridge, frame, &tx, &mut exchanges).await,
            Err(e) => warn!(error = %e, "ignoring undecodable UI frame"),
        }
        while exchanges.try_join_next().is_some() {}
    };

    exchanges.shutdown().await;
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    writer_done.cancel();
    if let Ok(Err(e)) = writer.await {
        warn!(error = %e, "relay output failed");
    }
    info!("relay stopped");
    outcome
}

async fn relay_frame(
    bridge: &Bridge,
    frame: Frame,
    tx: &mpsc::Sender<Frame>,
    exchanges: &mut JoinSet<()>,
) {
    if frame.message_type == ABORT_MESSAGE_TYPE {
        let target = frame.abort_target().or(frame.message_id);
        if let Some(target) = target {
            let aborted = bridge.abort(&target);
            debug!(target = %target, aborted, "UI abort");
        }
        return;
    }

    let Some(id) = frame.message_id.clone() else {
        if let Err(e) = bridge.post(&frame.message_type, frame.data).await {
            warn!(message_type = %frame.message_type, error = %e, "UI post failed");
        }
        return;
    };

    let bridge = bridge.clone();
    let tx = tx.clone();
    if bridge.config().termination.is_streaming(&frame.message_type) {
        exchanges.spawn(relay_stream(bridge, frame, id, tx));
    } else {
        exchanges.spawn(relay_request(bridge, frame, id, tx));
    }
}

/// Queue a push event for the UI without waiting. False if it was dropped.
fn forward_push(tx: &mpsc::Sender<Frame>, event: &PushEvent) -> bool {
    let frame = Frame {
        message_type: event.message_type.clone(),
        data: event.data.clone(),
        message_id: event.message_id.clone(),
    };
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            warn!(message_type = %frame.message_type, "UI output queue full, push event dropped");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

async fn relay_request(bridge: Bridge, frame: Frame, id: MessageId, tx: mpsc::Sender<Frame>) {
    let options = RequestOptions::new().with_id(id.clone());
    let reply = match bridge.request_with(&frame.message_type, frame.data, options).await {
        Ok(reply) => reply,
        Err(BridgeError::Cancelled) => return,
        Err(e) => error_frame(&frame.message_type, id, &e),
    };
    let _ = tx.send(reply).await;
}

async fn relay_stream(bridge: Bridge, frame: Frame, id: MessageId, tx: mpsc::Sender<Frame>) {
    let message_type = frame.message_type;
    let options = RequestOptions::new().with_id(id.clone());
    let mut chunks = bridge.stream_with(&message_type, frame.data, options);

    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) => {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            Err(BridgeError::Cancelled) => return,
            Err(e) => {
                let _ = tx.send(error_frame(&message_type, id, &e)).await;
                return;
            }
        }
    }

    if let Some(terminal) = chunks.terminal_frame() {
        let _ = tx.send(terminal.clone()).await;
    }
}

fn error_frame(message_type: &str, id: MessageId, error: &BridgeError) -> Frame {
    Frame::new(
        message_type,
        json!({ "error": error.to_string(), "code": error.error_code() }),
    )
    .with_id(id)
}

async fn write_frames<W>(
    mut output: W,
    mut rx: mpsc::Receiver<Frame>,
    done: CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framer = Framer::new();
    loop {
        let frame = tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = done.cancelled() => break,
        };
        write_frame(&mut output, &framer, &frame).await?;
    }
    while let Ok(frame) = rx.try_recv() {
        write_frame(&mut output, &framer, &frame).await?;
    }
    output.flush().await
}

async fn write_frame<W>(output: &mut W, framer: &Framer, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = match framer.encode(frame) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "cannot encode frame for UI");
            return Ok(());
        }
    };
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tether_core::{MemoryPeer, MemoryTransport, TerminationStyle};
    use tokio::io::{DuplexStream, Lines};

    struct Harness {
        bridge: Bridge,
        peer: MemoryPeer,
        ui_in: DuplexStream,
        ui_out: Lines<BufReader<DuplexStream>>,
        shutdown: CancellationToken,
        relay: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    impl Harness {
        async fn start() -> Self {
            Self::start_with(BridgeConfig::default().without_handshake()).await
        }

        async fn start_with(config: BridgeConfig) -> Self {
            let (transport, peer) = MemoryTransport::pair();
            let bridge = Bridge::connect(config, Arc::new(transport)).await.unwrap();
            let (ui_in, relay_in) = tokio::io::duplex(4096);
            let (relay_out, ui_out) = tokio::io::duplex(4096);
            let shutdown = CancellationToken::new();
            let relay = tokio::spawn({
                let bridge = bridge.clone();
                let shutdown = shutdown.clone();
                async move {
                    run(bridge, relay_in, relay_out, &["indexProgress".to_string()], shutdown).await
                }
            });
            Self {
                bridge,
                peer,
                ui_in,
                ui_out: BufReader::new(ui_out).lines(),
                shutdown,
                relay,
            }
        }

        async fn send(&mut self, line: &str) {
            self.ui_in.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        }

        async fn read(&mut self) -> Frame {
            let line = self.ui_out.next_line().await.unwrap().unwrap();
            Framer::new().decode(&line).unwrap()
        }
    }

    #[tokio::test]
    async fn test_request_keeps_ui_id() {
        let mut h = Harness::start().await;
        h.send(r#"{"messageType":"history/list","data":{},"messageId":"ui-1"}"#).await;

        let sent = h.peer.recv().await.unwrap();
        assert_eq!(sent.id_str(), Some("ui-1"));
        h.peer
            .push(Frame::new("history/list", json!([])).with_id("ui-1"))
            .await
            .unwrap();

        let reply = h.read().await;
        assert_eq!(reply.id_str(), Some("ui-1"));
        assert_eq!(reply.data, json!([]));

        h.shutdown.cancel();
        h.relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stream_chunks_and_terminal_frame() {
        let mut h = Harness::start().await;
        h.send(r#"{"messageType":"llm/streamChat","data":{"messages":[]},"messageId":"ui-2"}"#)
            .await;
        h.peer.recv().await.unwrap();
        for data in [
            json!({"content": "a"}),
            json!({"done": true, "content": "ab", "usage": {"tokens": 3}}),
        ] {
            h.peer
                .push(Frame::new("llm/streamChat", data).with_id("ui-2"))
                .await
                .unwrap();
        }

        assert_eq!(h.read().await.data, json!({"content": "a"}));
        let last = h.read().await;
        assert_eq!(last.id_str(), Some("ui-2"));
        assert_eq!(last.data, json!({"done": true, "content": "ab", "usage": {"tokens": 3}}));
    }

    #[tokio::test]
    async fn test_ui_abort_reaches_service() {
        let mut h = Harness::start().await;
        h.send(r#"{"messageType":"llm/streamChat","data":{},"messageId":"ui-3"}"#).await;
        h.peer.recv().await.unwrap();

        h.send(r#"{"messageType":"abort","data":{"targetId":"ui-3"},"messageId":"ui-4"}"#).await;
        let abort = h.peer.recv().await.unwrap();
        assert_eq!(abort.abort_target(), Some(MessageId::from("ui-3")));
        assert_eq!(h.bridge.pending(), 0);
    }

    #[tokio::test]
    async fn test_push_events_forwarded_and_errors_reported() {
        let mut h = Harness::start().await;
        h.peer
            .push(Frame::new("indexProgress", json!({"progress": 0.5})))
            .await
            .unwrap();
        let pushed = h.read().await;
        assert_eq!(pushed.message_type, "indexProgress");
        assert!(pushed.is_event());

        h.send("not a frame").await;
        h.send(r#"{"messageType":"mystery","data":{},"messageId":"ui-5"}"#).await;
        let error = h.read().await;
        assert_eq!(error.id_str(), Some("ui-5"));
        assert_eq!(error.data["code"], "BRIDGE_UNROUTABLE");
    }

    #[tokio::test]
    async fn test_input_eof_stops_relay() {
        let h = Harness::start().await;
        drop(h.ui_in);
        h.relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_sentinel_terminal_frame_forwarded() {
        let mut config = BridgeConfig::default().without_handshake();
        config.termination = config.termination.with_override(
            "command/run",
            TerminationStyle::Sentinel {
                message_type: "command/end".into(),
            },
        );
        let mut h = Harness::start_with(config).await;
        h.send(r#"{"messageType":"command/run","data":{"input":"/edit"},"messageId":"ui-6"}"#)
            .await;
        h.peer.recv().await.unwrap();
        h.peer
            .push(Frame::new("command/end", json!({"exitCode": 0})).with_id("ui-6"))
            .await
            .unwrap();

        let last = h.read().await;
        assert_eq!(last.message_type, "command/end");
        assert_eq!(last.id_str(), Some("ui-6"));
        assert_eq!(last.data, json!({"exitCode": 0}));
    }

    #[tokio::test]
    async fn test_push_forwarding_drops_when_output_is_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let event = PushEvent::from_frame(Frame::new("indexProgress", json!(1)));
        assert!(forward_push(&tx, &event));
        assert!(!forward_push(&tx, &event));

        assert_eq!(rx.recv().await.unwrap().data, json!(1));
        assert!(forward_push(&tx, &event));
        drop(rx);
        assert!(!forward_push(&tx, &event));
    }
}
