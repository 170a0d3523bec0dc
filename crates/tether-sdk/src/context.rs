//! Editor context injection for chat calls

use crate::message_types as types;
use crate::payloads::RangeInFileWithContents;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tether_core::{Bridge, BridgeError, BridgeResult, Interceptor};
use tracing::debug;

/// Field the selection is attached under
pub const CONTEXT_FIELD: &str = "rangeInFileWithContents";

/// Supplies the editor's current file and selection
#[async_trait]
pub trait EditorContextProvider: Send + Sync {
    /// The active selection, or `None` when nothing is selected
    async fn current_selection(&self) -> Option<RangeInFileWithContents>;
}

/// Intercepted route that attaches the current selection to outbound chat calls
///
/// Object payloads gain a `rangeInFileWithContents` field unless the caller
/// already set one. Other payloads and all replies pass through unchanged.
pub struct EditorContextInterceptor {
    provider: Arc<dyn EditorContextProvider>,
}

impl EditorContextInterceptor {
    pub fn new(provider: Arc<dyn EditorContextProvider>) -> Self {
        Self { provider }
    }

    /// Register one interceptor for every chat call type on `bridge`
    pub fn install(bridge: &Bridge, provider: Arc<dyn EditorContextProvider>) -> BridgeResult<()> {
        let interceptor: Arc<dyn Interceptor> = Arc::new(Self::new(provider));
        for message_type in types::CHAT_TYPES {
            bridge.register_interceptor(message_type, interceptor.clone())?;
        }
        Ok(())
    }
}

#[async_trait]
impl Interceptor for EditorContextInterceptor {
    async fn before_send(&self, message_type: &str, mut data: Value) -> BridgeResult<Value> {
        let Value::Object(map) = &mut data else {
            return Ok(data);
        };
        if map.contains_key(CONTEXT_FIELD) {
            return Ok(data);
        }
        let Some(selection) = self.provider.current_selection().await else {
            return Ok(data);
        };
        debug!(message_type, filepath = %selection.filepath, "attaching editor selection");
        let value = serde_json::to_value(selection)
            .map_err(|e| BridgeError::serialization(e.to_string()))?;
        map.insert(CONTEXT_FIELD.to_string(), value);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::{BridgeConfig, Frame, MemoryTransport};

    struct Fixed(Option<RangeInFileWithContents>);

    #[async_trait]
    impl EditorContextProvider for Fixed {
        async fn current_selection(&self) -> Option<RangeInFileWithContents> {
            self.0.clone()
        }
    }

    fn selection() -> RangeInFileWithContents {
        RangeInFileWithContents::whole_file("/src/main.rs", "fn main() {}")
    }

    #[tokio::test]
    async fn test_selection_is_attached() {
        let interceptor = EditorContextInterceptor::new(Arc::new(Fixed(Some(selection()))));
        let data = interceptor
            .before_send(types::LLM_STREAM_CHAT, json!({"messages": []}))
            .await
            .unwrap();
        assert_eq!(data[CONTEXT_FIELD]["filepath"], "/src/main.rs");
        assert_eq!(data["messages"], json!([]));
    }

    #[tokio::test]
    async fn test_existing_context_and_non_objects_untouched() {
        let interceptor = EditorContextInterceptor::new(Arc::new(Fixed(Some(selection()))));
        let own = json!({"rangeInFileWithContents": "mine"});
        assert_eq!(interceptor.before_send("llm/complete", own.clone()).await.unwrap(), own);
        assert_eq!(
            interceptor.before_send("llm/complete", json!("raw")).await.unwrap(),
            json!("raw")
        );

        let empty = EditorContextInterceptor::new(Arc::new(Fixed(None)));
        assert_eq!(empty.before_send("llm/complete", json!({})).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_install_routes_chat_calls_through_interceptor() {
        let (transport, mut peer) = MemoryTransport::pair();
        let bridge = Bridge::connect(BridgeConfig::default().without_handshake(), Arc::new(transport))
            .await
            .unwrap();
        EditorContextInterceptor::install(&bridge, Arc::new(Fixed(Some(selection())))).unwrap();
        for message_type in types::CHAT_TYPES {
            assert_eq!(
                bridge.router().decide(message_type).unwrap().to_string(),
                "intercepted"
            );
        }
        assert!(EditorContextInterceptor::install(&bridge, Arc::new(Fixed(None))).is_err());

        bridge.post(types::LLM_COMPLETE, json!({"prompt": "why"})).await.unwrap();
        let sent: Frame = peer.recv().await.unwrap();
        assert_eq!(sent.data[CONTEXT_FIELD]["contents"], "fn main() {}");
    }
}
