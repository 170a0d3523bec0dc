//! Payload shapes of the assistant protocol
//!
//! Field names follow the wire format (camelCase). Session records carry
//! whatever extra fields the service stores so they round-trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a chat transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Zero-based line/character position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// A span of a file together with its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeInFileWithContents {
    pub filepath: String,
    pub range: Range,
    pub contents: String,
}

impl RangeInFileWithContents {
    /// The whole of `contents` as a range
    pub fn whole_file(filepath: impl Into<String>, contents: impl Into<String>) -> Self {
        let contents = contents.into();
        let last_line = contents.lines().count().saturating_sub(1) as u32;
        Self {
            filepath: filepath.into(),
            range: Range {
                start: Position::default(),
                end: Position::new(last_line, 0),
            },
            contents,
        }
    }
}

/// Summary of a stored chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_directory: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItemId {
    pub provider_title: String,
    pub item_id: String,
}

/// A piece of context returned by a context provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ContextItemId>,
    #[serde(default)]
    pub editable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_message_wire_form() {
        let value = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_range_in_file_uses_camel_case() {
        let value = serde_json::to_value(RangeInFileWithContents::whole_file(
            "/src/main.rs",
            "fn main() {}\n",
        ))
        .unwrap();
        assert_eq!(value["filepath"], "/src/main.rs");
        assert_eq!(value["range"]["end"], json!({"line": 0, "character": 0}));
    }

    #[test]
    fn test_session_info_keeps_unknown_fields() {
        let raw = json!({
            "sessionId": "s1",
            "title": "Refactor",
            "dateCreated": "1700000000",
            "history": [{"role": "user"}]
        });
        let info: SessionInfo = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(info.session_id, "s1");
        assert!(info.workspace_directory.is_none());
        assert!(info.extra.contains_key("history"));
        assert_eq!(serde_json::to_value(&info).unwrap(), raw);
    }

    #[test]
    fn test_context_item_defaults() {
        let item: ContextItem =
            serde_json::from_value(json!({"name": "README", "content": "# tether"})).unwrap();
        assert!(item.description.is_empty());
        assert!(item.id.is_none());
        assert!(!item.editable);
    }
}
