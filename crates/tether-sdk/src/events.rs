//! Typed editor push events
//!
//! The editor surface pushes a fixed set of notifications. [`EditorEvents`]
//! registers one decoder per type so callers handle a single enum instead of
//! raw frames.

use crate::error::{SdkError, SdkResult};
use crate::message_types as types;
use crate::payloads::RangeInFileWithContents;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tether_core::{Bridge, BridgeError, BridgeResult, EventHandler, PushEvent, Subscription};
use tokio::sync::mpsc;

/// A notification pushed by the editor surface
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// Focus the assistant input
    FocusInput,
    /// Focus the assistant input in edit mode
    FocusInputWithEdit,
    /// Code selected in the editor, to be added as context
    HighlightedCode {
        range: RangeInFileWithContents,
        edit: bool,
    },
    /// Text entered through the quick-input box
    UserInput { input: String },
    AddModel,
    OpenSettings,
    ViewHistory,
    /// Indexing progress, `0.0..=1.0`
    IndexProgress {
        progress: f64,
        description: Option<String>,
    },
    /// Proposed change to a file
    ShowDiff { filepath: String, new_contents: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HighlightedCodePayload {
    range_in_file_with_contents: RangeInFileWithContents,
    #[serde(default)]
    edit: bool,
}

#[derive(Deserialize)]
struct UserInputPayload {
    input: String,
}

#[derive(Deserialize)]
struct IndexProgressPayload {
    progress: f64,
    #[serde(default)]
    desc: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShowDiffPayload {
    filepath: String,
    new_contents: String,
}

fn payload<T: DeserializeOwned>(message_type: &str, data: &Value) -> SdkResult<T> {
    T::deserialize(data).map_err(|e| SdkError::unexpected(message_type, e.to_string()))
}

impl EditorEvent {
    /// Decode a push frame. Returns `Ok(None)` for types that are not editor events.
    pub fn decode(message_type: &str, data: &Value) -> SdkResult<Option<Self>> {
        let event = match message_type {
            types::FOCUS_INPUT => Self::FocusInput,
            types::FOCUS_INPUT_WITH_EDIT => Self::FocusInputWithEdit,
            types::HIGHLIGHTED_CODE => {
                let p: HighlightedCodePayload = payload(message_type, data)?;
                Self::HighlightedCode {
                    range: p.range_in_file_with_contents,
                    edit: p.edit,
                }
            }
            types::USER_INPUT => {
                let p: UserInputPayload = payload(message_type, data)?;
                Self::UserInput { input: p.input }
            }
            types::ADD_MODEL => Self::AddModel,
            types::OPEN_SETTINGS => Self::OpenSettings,
            types::VIEW_HISTORY => Self::ViewHistory,
            types::INDEX_PROGRESS => {
                let p: IndexProgressPayload = payload(message_type, data)?;
                Self::IndexProgress {
                    progress: p.progress,
                    description: p.desc,
                }
            }
            types::SHOW_DIFF => {
                let p: ShowDiffPayload = payload(message_type, data)?;
                Self::ShowDiff {
                    filepath: p.filepath,
                    new_contents: p.new_contents,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Wire message type of this event
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::FocusInput => types::FOCUS_INPUT,
            Self::FocusInputWithEdit => types::FOCUS_INPUT_WITH_EDIT,
            Self::HighlightedCode { .. } => types::HIGHLIGHTED_CODE,
            Self::UserInput { .. } => types::USER_INPUT,
            Self::AddModel => types::ADD_MODEL,
            Self::OpenSettings => types::OPEN_SETTINGS,
            Self::ViewHistory => types::VIEW_HISTORY,
            Self::IndexProgress { .. } => types::INDEX_PROGRESS,
            Self::ShowDiff { .. } => types::SHOW_DIFF,
        }
    }
}

struct EditorEventHandler<F> {
    handler: Arc<F>,
}

#[async_trait]
impl<F> EventHandler for EditorEventHandler<F>
where
    F: Fn(EditorEvent) + Send + Sync + 'static,
{
    async fn handle(&self, event: PushEvent) -> BridgeResult<()> {
        match EditorEvent::decode(&event.message_type, &event.data) {
            Ok(Some(decoded)) => {
                (self.handler)(decoded);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(BridgeError::decode(e.to_string())),
        }
    }
}

/// Subscriptions for every editor push event type
#[derive(Debug)]
pub struct EditorEvents {
    subscriptions: Vec<Subscription>,
}

impl EditorEvents {
    /// Route every editor event on `bridge` to `handler`
    ///
    /// Payloads that do not decode are logged by the bridge and skipped.
    pub fn subscribe<F>(bridge: &Bridge, handler: F) -> Self
    where
        F: Fn(EditorEvent) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let subscriptions = types::EDITOR_EVENTS
            .iter()
            .map(|message_type| {
                bridge.on(
                    message_type,
                    EditorEventHandler {
                        handler: handler.clone(),
                    },
                )
            })
            .collect();
        Self { subscriptions }
    }

    /// Deliver editor events through a channel instead of a callback
    pub fn channel(bridge: &Bridge) -> (Self, mpsc::UnboundedReceiver<EditorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = Self::subscribe(bridge, move |event| {
            let _ = tx.send(event);
        });
        (events, rx)
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Remove every subscription; returns how many were still registered
    pub fn unsubscribe(self) -> usize {
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.unsubscribe())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::{BridgeConfig, Frame, MemoryTransport};

    #[test]
    fn test_decode_highlighted_code() {
        let data = json!({
            "rangeInFileWithContents": {
                "filepath": "/src/lib.rs",
                "contents": "pub fn a() {}",
                "range": {
                    "start": {"line": 3, "character": 0},
                    "end": {"line": 3, "character": 13}
                }
            },
            "edit": true
        });
        let event = EditorEvent::decode(types::HIGHLIGHTED_CODE, &data).unwrap().unwrap();
        match &event {
            EditorEvent::HighlightedCode { range, edit } => {
                assert!(*edit);
                assert_eq!(range.filepath, "/src/lib.rs");
                assert_eq!(range.range.end.character, 13);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(event.message_type(), types::HIGHLIGHTED_CODE);
    }

    #[test]
    fn test_decode_unknown_and_invalid() {
        assert_eq!(EditorEvent::decode("somethingElse", &json!({})).unwrap(), None);
        assert!(EditorEvent::decode(types::USER_INPUT, &json!({"text": "x"})).is_err());
        assert_eq!(
            EditorEvent::decode(types::FOCUS_INPUT, &Value::Null).unwrap(),
            Some(EditorEvent::FocusInput)
        );
    }

    #[tokio::test]
    async fn test_events_arrive_through_channel() {
        let (transport, peer) = MemoryTransport::pair();
        let bridge = Bridge::connect(BridgeConfig::default().without_handshake(), Arc::new(transport))
            .await
            .unwrap();
        let (events, mut rx) = EditorEvents::channel(&bridge);
        assert_eq!(events.len(), types::EDITOR_EVENTS.len());

        peer.push(Frame::new(types::USER_INPUT, json!({"input": "/edit"}))).await.unwrap();
        peer.push(Frame::new(types::INDEX_PROGRESS, json!("bad"))).await.unwrap();
        peer.push(Frame::new(types::INDEX_PROGRESS, json!({"progress": 0.5, "desc": "Indexing"})))
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            EditorEvent::UserInput {
                input: "/edit".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            EditorEvent::IndexProgress {
                progress: 0.5,
                description: Some("Indexing".to_string())
            }
        );

        assert_eq!(events.unsubscribe(), types::EDITOR_EVENTS.len());
    }
}
