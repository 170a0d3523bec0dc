//! Typed client for the assistant service

use crate::error::{SdkError, SdkResult};
use crate::message_types as types;
use crate::payloads::{ChatMessage, ContextItem, SessionInfo};
use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tether_core::{Bridge, ChunkStream, Frame, MessageId};
use tracing::{debug, instrument};

/// Request/reply and streaming calls of the assistant protocol
///
/// Cheap to clone; every clone shares the same bridge.
#[derive(Debug, Clone)]
pub struct AssistantClient {
    bridge: Bridge,
}

impl AssistantClient {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    /// The bridge this client talks through
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Session id established by the handshake, when it was a string
    pub fn session_id(&self) -> Option<&str> {
        self.bridge.session().and_then(|s| s.as_str())
    }

    async fn call(&self, message_type: &str, data: Value) -> SdkResult<Frame> {
        Ok(self.bridge.request(message_type, data).await?)
    }

    async fn call_decoded<T: DeserializeOwned>(&self, message_type: &str, data: Value) -> SdkResult<T> {
        let frame = self.call(message_type, data).await?;
        decode(&frame)
    }

    /// Single-shot completion
    #[instrument(skip(self, prompt))]
    pub async fn complete(&self, prompt: &str) -> SdkResult<String> {
        let frame = self.call(types::LLM_COMPLETE, json!({ "prompt": prompt })).await?;
        text_of(&frame.data).ok_or_else(|| SdkError::unexpected(types::LLM_COMPLETE, "reply has no text"))
    }

    /// Streamed completion of a raw prompt
    pub fn stream_complete(&self, prompt: &str) -> TextStream {
        TextStream::new(self.bridge.stream(types::LLM_STREAM_COMPLETE, json!({ "prompt": prompt })))
    }

    /// Streamed chat reply; yields text deltas
    pub fn stream_chat(&self, messages: Vec<ChatMessage>) -> TextStream {
        TextStream::new(self.bridge.stream(types::LLM_STREAM_CHAT, json!({ "messages": messages })))
    }

    /// Run a slash command; yields its output as it is produced
    pub fn run_command(&self, input: &str, history: Vec<ChatMessage>) -> TextStream {
        TextStream::new(self.bridge.stream(
            types::COMMAND_RUN,
            json!({ "input": input, "history": history }),
        ))
    }

    pub async fn history_list(&self) -> SdkResult<Vec<SessionInfo>> {
        self.call_decoded(types::HISTORY_LIST, json!({})).await
    }

    pub async fn history_load(&self, session_id: &str) -> SdkResult<SessionInfo> {
        self.call_decoded(types::HISTORY_LOAD, json!({ "id": session_id })).await
    }

    pub async fn history_save(&self, session: &SessionInfo) -> SdkResult<()> {
        let data = serde_json::to_value(session)
            .map_err(|e| SdkError::encode(types::HISTORY_SAVE, e.to_string()))?;
        self.call(types::HISTORY_SAVE, data).await?;
        Ok(())
    }

    pub async fn history_delete(&self, session_id: &str) -> SdkResult<()> {
        self.call(types::HISTORY_DELETE, json!({ "id": session_id })).await?;
        Ok(())
    }

    /// Ask a context provider for items matching `query`
    pub async fn context_items(&self, provider: &str, query: &str) -> SdkResult<Vec<ContextItem>> {
        self.call_decoded(
            types::CONTEXT_GET_CONTEXT_ITEMS,
            json!({ "name": provider, "query": query, "fullInput": query }),
        )
        .await
    }

    /// Store an OpenAI key in the assistant's config (fire-and-forget)
    pub async fn add_openai_key(&self, key: &str) -> SdkResult<()> {
        self.bridge.post(types::CONFIG_ADD_OPENAI_KEY, json!(key)).await?;
        Ok(())
    }

    /// Record a dev-data event (fire-and-forget)
    pub async fn log_dev_data(&self, table: &str, data: Value) -> SdkResult<()> {
        self.bridge
            .post(types::DEVDATA_LOG, json!({ "tableName": table, "data": data }))
            .await?;
        Ok(())
    }

    /// Directory the assistant keeps its state in
    pub async fn continue_dir(&self) -> SdkResult<PathBuf> {
        let frame = self.call(types::GET_CONTINUE_DIR, Value::Null).await?;
        match frame.data {
            Value::String(dir) => Ok(PathBuf::from(dir)),
            other => Err(SdkError::unexpected(
                types::GET_CONTINUE_DIR,
                format!("expected a path string, got {other}"),
            )),
        }
    }

    /// Abort an exchange started through this client
    pub fn abort(&self, id: &MessageId) -> bool {
        self.bridge.abort(id)
    }
}

fn decode<T: DeserializeOwned>(frame: &Frame) -> SdkResult<T> {
    T::deserialize(&frame.data).map_err(|e| SdkError::unexpected(&frame.message_type, e.to_string()))
}

/// Text carried by a reply or chunk: a bare string or `{"content": "..."}`
fn text_of(data: &Value) -> Option<String> {
    match data {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("content").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Text deltas of a streamed reply
///
/// Dropping it early aborts the exchange.
#[derive(Debug)]
pub struct TextStream {
    inner: ChunkStream,
}

impl TextStream {
    fn new(inner: ChunkStream) -> Self {
        Self { inner }
    }

    /// Correlation id of the exchange
    pub fn id(&self) -> &MessageId {
        self.inner.id()
    }

    /// Payload carried by the terminal frame, once the stream has ended
    pub fn completion(&self) -> Option<&Value> {
        self.inner.completion()
    }

    /// The underlying frame stream
    pub fn into_inner(self) -> ChunkStream {
        self.inner
    }
}

impl Stream for TextStream {
    type Item = SdkResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                None => return Poll::Ready(None),
                Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                Some(Ok(frame)) => {
                    if let Some(text) = text_of(&frame.data) {
                        return Poll::Ready(Some(Ok(text)));
                    }
                    debug!(message_type = %frame.message_type, "skipping chunk without text");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;
    use tether_core::{BridgeConfig, BridgeError, MemoryPeer, MemoryTransport};

    async fn setup() -> (AssistantClient, MemoryPeer) {
        let (transport, peer) = MemoryTransport::pair();
        let bridge = Bridge::connect(BridgeConfig::default().without_handshake(), Arc::new(transport))
            .await
            .unwrap();
        (AssistantClient::new(bridge), peer)
    }

    /// Answer the next request with `data`
    async fn answer(peer: &mut MemoryPeer, data: Value) -> Frame {
        let request = peer.recv().await.unwrap();
        let id = request.message_id.clone().unwrap();
        peer.push(Frame::new(request.message_type.clone(), data).with_id(id))
            .await
            .unwrap();
        request
    }

    #[tokio::test]
    async fn test_complete() {
        let (client, mut peer) = setup().await;
        let (reply, request) = tokio::join!(client.complete("2+2"), answer(&mut peer, json!("4")));
        assert_eq!(reply.unwrap(), "4");
        assert_eq!(request.message_type, types::LLM_COMPLETE);
        assert_eq!(request.data, json!({"prompt": "2+2"}));
    }

    #[tokio::test]
    async fn test_complete_rejects_non_text_reply() {
        let (client, mut peer) = setup().await;
        let (reply, _) = tokio::join!(client.complete("hi"), answer(&mut peer, json!(42)));
        assert!(matches!(reply, Err(SdkError::UnexpectedPayload { .. })));
    }

    #[tokio::test]
    async fn test_stream_chat_yields_deltas() {
        let (client, mut peer) = setup().await;
        let mut deltas = client.stream_chat(vec![ChatMessage::user("hello")]);
        let id = deltas.id().clone();

        let (first, _) = tokio::join!(deltas.next(), async {
            let request = peer.recv().await.unwrap();
            assert_eq!(request.data["messages"][0]["content"], "hello");
            for data in [
                json!({"content": "Hel"}),
                json!({"role": "assistant"}),
                json!({"content": "lo"}),
                json!({"done": true}),
            ] {
                peer.push(Frame::new(types::LLM_STREAM_CHAT, data).with_id(id.clone()))
                    .await
                    .unwrap();
            }
        });
        assert_eq!(first.unwrap().unwrap(), "Hel");
        let rest: Vec<_> = deltas.collect().await;
        assert_eq!(rest, vec![Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn test_history_calls() {
        let (client, mut peer) = setup().await;
        let list = json!([{"sessionId": "s1", "title": "First"}]);
        let (sessions, _) = tokio::join!(client.history_list(), answer(&mut peer, list));
        let sessions = sessions.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "First");

        let (deleted, request) =
            tokio::join!(client.history_delete("s1"), answer(&mut peer, Value::Null));
        deleted.unwrap();
        assert_eq!(request.data, json!({"id": "s1"}));

        let (loaded, _) = tokio::join!(
            client.history_load("s1"),
            answer(&mut peer, json!({"title": "missing id"}))
        );
        assert!(matches!(loaded, Err(SdkError::UnexpectedPayload { .. })));
    }

    #[tokio::test]
    async fn test_context_items() {
        let (client, mut peer) = setup().await;
        let items = json!([{"name": "main.rs", "content": "fn main() {}"}]);
        let (result, request) =
            tokio::join!(client.context_items("file", "main"), answer(&mut peer, items));
        assert_eq!(result.unwrap()[0].name, "main.rs");
        assert_eq!(request.data["name"], "file");
    }

    #[tokio::test]
    async fn test_fire_and_forget_calls_carry_no_id() {
        let (client, mut peer) = setup().await;
        client.add_openai_key("sk-test").await.unwrap();
        let frame = peer.recv().await.unwrap();
        assert_eq!(frame.message_type, types::CONFIG_ADD_OPENAI_KEY);
        assert!(frame.is_event());
        assert_eq!(client.bridge().pending(), 0);
    }

    #[tokio::test]
    async fn test_continue_dir() {
        let (client, mut peer) = setup().await;
        let (dir, _) = tokio::join!(client.continue_dir(), answer(&mut peer, json!("/home/me/.continue")));
        assert_eq!(dir.unwrap(), PathBuf::from("/home/me/.continue"));
    }

    #[tokio::test]
    async fn test_bridge_failures_pass_through() {
        let (client, peer) = setup().await;
        peer.disconnect("gone").await.unwrap();
        let err = client.history_list().await.unwrap_err();
        assert_eq!(err.as_bridge(), Some(&BridgeError::channel_closed()));
    }
}
