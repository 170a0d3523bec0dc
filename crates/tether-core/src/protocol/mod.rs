//! Wire protocol for the editor ↔ assistant channel
//!
//! Every unit on the wire is a [`Frame`]:
//!
//! ```json
//! {"messageType": "llm/complete", "data": {"prompt": "hi"}, "messageId": "abc"}
//! ```
//!
//! `messageId` is omitted for one-way notifications and pushed events.
//! Streaming replies reuse the request's id on every chunk and end with a
//! terminal marker whose shape is configured per message type
//! (see [`TerminationStyle`]).

pub mod frame;
pub mod framer;
pub mod ids;
pub mod termination;

pub use frame::{ABORT_MESSAGE_TYPE, Frame, MessageId};
pub use framer::Framer;
pub use ids::{IdStrategy, MessageIdGenerator};
pub use termination::{TerminationRules, TerminationStyle};
