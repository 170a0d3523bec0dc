//! Pass-through allow-list
//!
//! Message types in this list are always forwarded to the assistant service
//! untouched. The table is data: hosts replace it from the config file
//! (`routing.pass_through`) rather than patching the router.

use std::collections::HashSet;

/// Message types forwarded to the assistant service by default
pub const DEFAULT_PASS_THROUGH: &[&str] = &[
    // control
    "abort",
    "getContinueDir",
    // session history
    "history/list",
    "history/save",
    "history/delete",
    "history/load",
    "devdata/log",
    // configuration mutation
    "config/addModel",
    "config/deleteModel",
    "config/addOpenAIKey",
    "config/getBrowserSerialized",
    // model invocation
    "llm/streamComplete",
    "llm/streamChat",
    "llm/complete",
    // command execution
    "command/run",
    // context retrieval
    "context/loadSubmenuItems",
    "context/getContextItems",
    "context/addDocs",
];

/// O(1) membership set of pass-through message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassThroughList {
    types: HashSet<String>,
}

impl Default for PassThroughList {
    fn default() -> Self {
        Self::new(DEFAULT_PASS_THROUGH.iter().copied())
    }
}

impl PassThroughList {
    /// Build a list from message types
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `message_type` is forwarded untouched
    pub fn contains(&self, message_type: &str) -> bool {
        self.types.contains(message_type)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Entries in sorted order, for display
    pub fn sorted(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.types.iter().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Default pass-through list as owned strings
pub fn default_pass_through() -> Vec<String> {
    DEFAULT_PASS_THROUGH.iter().map(|s| s.to_string()).collect()
}
