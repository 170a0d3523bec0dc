//! Stream termination rules
//!
//! A streaming reply ends either with a `done: true` flag inside `data` or
//! with a distinguished sentinel message type. Which one applies is decided
//! per message type from configuration.

use super::frame::Frame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Message types that are streamed by default
pub const DEFAULT_STREAMING_TYPES: &[&str] = &["llm/streamChat", "llm/streamComplete", "command/run"];

/// How the end of a stream is signalled
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum TerminationStyle {
    /// `data.done == true` marks the last frame
    #[default]
    DoneField,
    /// A frame whose type equals `message_type` marks the end
    Sentinel { message_type: String },
}

impl TerminationStyle {
    /// Whether `frame` closes the stream
    pub fn is_terminal(&self, frame: &Frame) -> bool {
        match self {
            Self::DoneField => frame
                .data
                .get("done")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Self::Sentinel { message_type } => frame.message_type == *message_type,
        }
    }

    /// Trailing payload carried by a terminal frame, if any
    pub fn completion(&self, frame: &Frame) -> Option<Value> {
        let trailer = match self {
            Self::DoneField => frame.data.get("content").cloned(),
            Self::Sentinel { .. } => Some(frame.data.clone()),
        };
        trailer.filter(|v| !v.is_null())
    }
}

/// Per message type termination styles plus the set of streamed types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationRules {
    /// Style used when a type has no override
    pub default: TerminationStyle,
    /// Per-type overrides
    pub overrides: HashMap<String, TerminationStyle>,
    /// Types whose replies are streams rather than single frames
    pub streaming_types: HashSet<String>,
}

impl Default for TerminationRules {
    fn default() -> Self {
        Self {
            default: TerminationStyle::default(),
            overrides: HashMap::new(),
            streaming_types: DEFAULT_STREAMING_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TerminationRules {
    /// Style that applies to `message_type`
    pub fn style_for(&self, message_type: &str) -> &TerminationStyle {
        self.overrides.get(message_type).unwrap_or(&self.default)
    }

    /// Override the style for one type
    pub fn with_override(mut self, message_type: impl Into<String>, style: TerminationStyle) -> Self {
        self.overrides.insert(message_type.into(), style);
        self
    }

    /// Whether replies to `message_type` are streamed
    pub fn is_streaming(&self, message_type: &str) -> bool {
        self.streaming_types.contains(message_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_done_field_detection() {
        let style = TerminationStyle::DoneField;
        assert!(!style.is_terminal(&Frame::new("llm/streamChat", json!("He"))));
        assert!(!style.is_terminal(&Frame::new("llm/streamChat", json!({"done": false}))));
        assert!(style.is_terminal(&Frame::new("llm/streamChat", json!({"done": true}))));
    }

    #[test]
    fn test_done_field_completion() {
        let style = TerminationStyle::DoneField;
        let frame = Frame::new("llm/streamChat", json!({"done": true, "content": {"tokens": 12}}));
        assert_eq!(style.completion(&frame), Some(json!({"tokens": 12})));
        let bare = Frame::new("llm/streamChat", json!({"done": true}));
        assert_eq!(style.completion(&bare), None);
    }

    #[test]
    fn test_sentinel_detection() {
        let style = TerminationStyle::Sentinel {
            message_type: "stream/end".to_string(),
        };
        assert!(style.is_terminal(&Frame::new("stream/end", Value::Null)));
        assert!(!style.is_terminal(&Frame::new("command/run", json!({"done": true}))));
        assert_eq!(style.completion(&Frame::new("stream/end", Value::Null)), None);
    }

    #[test]
    fn test_rules_overrides() {
        let rules = TerminationRules::default().with_override(
            "command/run",
            TerminationStyle::Sentinel {
                message_type: "command/end".to_string(),
            },
        );
        assert_eq!(rules.style_for("llm/streamChat"), &TerminationStyle::DoneField);
        assert!(matches!(rules.style_for("command/run"), TerminationStyle::Sentinel { .. }));
        assert!(rules.is_streaming("llm/streamChat"));
        assert!(!rules.is_streaming("llm/complete"));
    }

    #[test]
    fn test_rules_deserialize() {
        let rules: TerminationRules = serde_json::from_value(json!({
            "overrides": {"command/run": {"style": "sentinel", "message_type": "command/end"}}
        }))
        .unwrap();
        assert_eq!(rules.default, TerminationStyle::DoneField);
        assert!(rules.is_streaming("llm/streamComplete"));
        assert_eq!(
            rules.style_for("command/run"),
            &TerminationStyle::Sentinel {
                message_type: "command/end".to_string()
            }
        );
    }
}
