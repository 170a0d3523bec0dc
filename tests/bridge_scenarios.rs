//! End-to-end exchange scenarios over the in-memory transport
//!
//! The peer side of the pair plays the assistant service.

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tether::core::router::RouteDecision;
use tether::{
    Bridge, BridgeConfig, BridgeError, BridgeEvent, Frame, MemoryPeer, MemoryTransport, MessageId,
    RequestOptions,
};

async fn connect() -> (Bridge, MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    let bridge = Bridge::connect(BridgeConfig::default().without_handshake(), Arc::new(transport))
        .await
        .unwrap();
    (bridge, peer)
}

#[tokio::test]
async fn completion_request_round_trip() {
    let (bridge, mut peer) = connect().await;
    let call = tokio::spawn(bridge.request_with(
        "llm/complete",
        json!({"prompt": "hi"}),
        RequestOptions::new().with_id("abc"),
    ));

    let sent = peer.recv().await.unwrap();
    assert_eq!(sent.id_str(), Some("abc"));
    peer.push(Frame::new("llm/complete", json!({"text": "hello"})).with_id("abc"))
        .await
        .unwrap();

    let reply = call.await.unwrap().unwrap();
    assert_eq!(reply.message_id, sent.message_id);
    assert_eq!(reply.data, json!({"text": "hello"}));
}

#[tokio::test]
async fn replies_correlate_under_interleaving() {
    let (bridge, mut peer) = connect().await;
    let calls: Vec<_> = (0..8)
        .map(|i| tokio::spawn(bridge.request("history/load", json!({ "n": i }))))
        .collect();

    let mut sent = Vec::new();
    for _ in 0..8 {
        sent.push(peer.recv().await.unwrap());
    }
    for frame in sent.iter().rev() {
        let echo = Frame::new("history/load", frame.data.clone())
            .with_id(frame.message_id.clone().unwrap());
        peer.push(echo).await.unwrap();
    }

    for (i, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap().unwrap().data, json!({ "n": i }));
    }
    assert_eq!(bridge.pending(), 0);
}

#[tokio::test]
async fn stream_preserves_chunk_order() {
    let (bridge, mut peer) = connect().await;
    let mut stream = bridge.stream("llm/streamChat", json!({"messages": []}));
    let id = stream.id().clone();

    let (first, _) = tokio::join!(stream.next(), async {
        peer.recv().await.unwrap();
        for i in 0..20 {
            peer.push(Frame::new("llm/streamChat", json!(i)).with_id(id.clone()))
                .await
                .unwrap();
        }
        peer.push(Frame::new("llm/streamChat", json!({"done": true})).with_id(id.clone()))
            .await
            .unwrap();
    });

    let mut seen = vec![first.unwrap().unwrap().data];
    while let Some(chunk) = stream.next().await {
        seen.push(chunk.unwrap().data);
    }
    assert_eq!(seen, (0..20).map(|i| json!(i)).collect::<Vec<_>>());
    assert!(stream.is_finished());
}

#[tokio::test]
async fn abort_between_chunks_hides_the_rest() {
    let (bridge, mut peer) = connect().await;
    let mut stream = bridge.stream("llm/streamChat", json!({}));
    let id = stream.id().clone();

    let (first, _) = tokio::join!(stream.next(), async {
        peer.recv().await.unwrap();
        peer.push(Frame::new("llm/streamChat", json!("He")).with_id(id.clone()))
            .await
            .unwrap();
    });
    assert_eq!(first.unwrap().unwrap().data, json!("He"));

    bridge.abort(&id);
    peer.push(Frame::new("llm/streamChat", json!("llo")).with_id(id.clone()))
        .await
        .unwrap();

    assert_eq!(stream.next().await, Some(Err(BridgeError::Cancelled)));
    assert_eq!(stream.next().await, None);

    let abort = peer.recv().await.unwrap();
    assert_eq!(abort.message_type, "abort");
    assert_eq!(abort.data, json!({"targetId": id.as_str()}));
}

#[tokio::test]
async fn abort_returns_table_to_baseline() {
    let (bridge, mut peer) = connect().await;
    let baseline = bridge.pending();

    let call = bridge.request("llm/complete", json!({}));
    let id = call.id().clone();
    let call = tokio::spawn(call);
    peer.recv().await.unwrap();
    assert_eq!(bridge.pending(), baseline + 1);

    assert!(bridge.abort(&id));
    assert_eq!(call.await.unwrap(), Err(BridgeError::Cancelled));
    assert_eq!(bridge.pending(), baseline);
}

#[tokio::test]
async fn channel_loss_rejects_every_pending_exchange() {
    let (bridge, mut peer) = connect().await;
    let mut events = bridge.events();
    let calls: Vec<_> = (0..5)
        .map(|_| tokio::spawn(bridge.request("history/list", json!({}))))
        .collect();
    for _ in 0..5 {
        peer.recv().await.unwrap();
    }

    peer.disconnect("connection reset").await.unwrap();
    for call in calls {
        assert_eq!(
            call.await.unwrap(),
            Err(BridgeError::channel_closed_because("connection reset"))
        );
    }
    assert_eq!(bridge.pending(), 0);

    let rejected = loop {
        if let BridgeEvent::Disconnected { rejected, .. } = events.recv().await.unwrap() {
            break rejected;
        }
    };
    assert_eq!(rejected, 5);
}

#[tokio::test]
async fn pass_through_wins_over_local_registrations() {
    let (bridge, _peer) = connect().await;
    bridge
        .register_local_fn("showDiff", |data| async move { Ok(data) })
        .unwrap();
    assert_eq!(
        bridge.router().decide("config/addOpenAIKey").unwrap(),
        RouteDecision::Remote
    );
    assert!(
        bridge
            .register_local_fn("config/addOpenAIKey", |data| async move { Ok(data) })
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_is_local_and_final() {
    let (bridge, mut peer) = connect().await;
    let call = bridge.request_with(
        "llm/complete",
        json!({}),
        RequestOptions::new()
            .with_id(MessageId::from("slow"))
            .with_timeout(Duration::from_millis(100)),
    );
    assert_eq!(call.await, Err(BridgeError::timeout(Duration::from_millis(100))));
    assert_eq!(bridge.pending(), 0);

    // the id is free again
    let again = tokio::spawn(bridge.request_with(
        "llm/complete",
        json!({}),
        RequestOptions::new().with_id("slow"),
    ));
    peer.recv().await.unwrap();
    peer.recv().await.unwrap();
    peer.recv().await.unwrap();
    peer.push(Frame::new("llm/complete", json!("ok")).with_id("slow"))
        .await
        .unwrap();
    assert_eq!(again.await.unwrap().unwrap().data, json!("ok"));
}
