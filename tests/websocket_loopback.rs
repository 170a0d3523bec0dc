//! Bridge, SDK client and WebSocket transport against a loopback service

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use tether::core::recovery::ReconnectConfig;
use tether::sdk::ChatMessage;
use tether::{AssistantClient, Bridge, BridgeConfig, BridgeEvent, Frame, WebSocketTransport};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

fn frame_of(text: &str) -> Frame {
    serde_json::from_str(text).unwrap()
}

fn text_of(frame: &Frame) -> Message {
    Message::Text(serde_json::to_string(frame).unwrap().into())
}

/// A small assistant service: answers the handshake, completes prompts and
/// streams two deltas for chat.
async fn serve(listener: TcpListener) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(tcp).await.unwrap();

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let request = frame_of(text.as_str());
        let Some(id) = request.message_id.clone() else {
            continue;
        };
        let replies: Vec<Value> = match request.message_type.as_str() {
            "getSessionId" => vec![json!("loopback-session")],
            "llm/complete" => vec![json!(format!("echo: {}", request.data["prompt"].as_str().unwrap_or("")))],
            "llm/streamChat" => vec![
                json!({"content": "Hel"}),
                json!({"content": "lo"}),
                json!({"done": true, "content": {"usage": 2}}),
            ],
            _ => vec![Value::Null],
        };
        for data in replies {
            let reply = Frame::new(request.message_type.clone(), data).with_id(id.clone());
            ws.send(text_of(&reply)).await.unwrap();
        }
    }
}

#[tokio::test]
async fn sdk_client_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let service = tokio::spawn(serve(listener));

    let config = BridgeConfig::default().with_url(url.clone());
    let transport = Arc::new(WebSocketTransport::new(url).with_reconnect(ReconnectConfig::disabled()));
    let bridge = Bridge::connect(config, transport).await.unwrap();
    assert_eq!(
        bridge.session().and_then(|s| s.as_str()),
        Some("loopback-session")
    );

    let client = AssistantClient::new(bridge.clone());
    assert_eq!(client.complete("ping").await.unwrap(), "echo: ping");

    let deltas: Vec<String> = client
        .stream_chat(vec![ChatMessage::user("hi")])
        .map(|delta| delta.unwrap())
        .collect()
        .await;
    assert_eq!(deltas.concat(), "Hello");
    assert_eq!(bridge.pending(), 0);

    let mut events = bridge.events();
    bridge.close().await;
    service.abort();
    assert!(!bridge.is_connected());
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, BridgeEvent::UnmatchedReply { .. }));
    }
}
