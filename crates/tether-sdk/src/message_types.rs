//! Message type names of the assistant protocol

/// Abort an in-flight exchange
pub const ABORT: &str = tether_core::protocol::ABORT_MESSAGE_TYPE;
/// Session handshake
pub const GET_SESSION_ID: &str = "getSessionId";
/// Directory the assistant keeps its state in
pub const GET_CONTINUE_DIR: &str = "getContinueDir";

pub const HISTORY_LIST: &str = "history/list";
pub const HISTORY_SAVE: &str = "history/save";
pub const HISTORY_DELETE: &str = "history/delete";
pub const HISTORY_LOAD: &str = "history/load";

pub const DEVDATA_LOG: &str = "devdata/log";

pub const CONFIG_ADD_MODEL: &str = "config/addModel";
pub const CONFIG_DELETE_MODEL: &str = "config/deleteModel";
pub const CONFIG_ADD_OPENAI_KEY: &str = "config/addOpenAIKey";
pub const CONFIG_GET_BROWSER_SERIALIZED: &str = "config/getBrowserSerialized";

pub const LLM_STREAM_COMPLETE: &str = "llm/streamComplete";
pub const LLM_STREAM_CHAT: &str = "llm/streamChat";
pub const LLM_COMPLETE: &str = "llm/complete";

pub const COMMAND_RUN: &str = "command/run";

pub const CONTEXT_LOAD_SUBMENU_ITEMS: &str = "context/loadSubmenuItems";
pub const CONTEXT_GET_CONTEXT_ITEMS: &str = "context/getContextItems";
pub const CONTEXT_ADD_DOCS: &str = "context/addDocs";

/// Calls that take editor context, in the order the interceptor is installed
pub const CHAT_TYPES: &[&str] = &[LLM_STREAM_CHAT, LLM_STREAM_COMPLETE, LLM_COMPLETE];

// Editor push events
pub const FOCUS_INPUT: &str = "focusContinueInput";
pub const FOCUS_INPUT_WITH_EDIT: &str = "focusContinueInputWithEdit";
pub const HIGHLIGHTED_CODE: &str = "highlightedCode";
pub const USER_INPUT: &str = "userInput";
pub const ADD_MODEL: &str = "addModel";
pub const OPEN_SETTINGS: &str = "openSettings";
pub const VIEW_HISTORY: &str = "viewHistory";
pub const INDEX_PROGRESS: &str = "indexProgress";
pub const SHOW_DIFF: &str = "showDiff";

/// Every editor push event type
pub const EDITOR_EVENTS: &[&str] = &[
    FOCUS_INPUT,
    FOCUS_INPUT_WITH_EDIT,
    HIGHLIGHTED_CODE,
    USER_INPUT,
    ADD_MODEL,
    OPEN_SETTINGS,
    VIEW_HISTORY,
    INDEX_PROGRESS,
    SHOW_DIFF,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::router::PassThroughList;

    #[test]
    fn test_remote_calls_are_pass_through_by_default() {
        let list = PassThroughList::default();
        for t in [
            ABORT,
            GET_CONTINUE_DIR,
            HISTORY_LIST,
            HISTORY_SAVE,
            HISTORY_DELETE,
            HISTORY_LOAD,
            DEVDATA_LOG,
            CONFIG_ADD_MODEL,
            CONFIG_DELETE_MODEL,
            CONFIG_ADD_OPENAI_KEY,
            CONFIG_GET_BROWSER_SERIALIZED,
            LLM_STREAM_COMPLETE,
            LLM_STREAM_CHAT,
            LLM_COMPLETE,
            COMMAND_RUN,
            CONTEXT_LOAD_SUBMENU_ITEMS,
            CONTEXT_GET_CONTEXT_ITEMS,
            CONTEXT_ADD_DOCS,
        ] {
            assert!(list.contains(t), "{t} should pass through");
        }
    }

    #[test]
    fn test_editor_events_are_not_pass_through() {
        let list = PassThroughList::default();
        assert!(EDITOR_EVENTS.iter().all(|t| !list.contains(t)));
    }
}
