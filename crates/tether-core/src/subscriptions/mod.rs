//! Push-event subscriptions

pub mod handlers;
pub mod registry;
pub mod types;

pub use handlers::{EventHandler, FnHandler, TypedHandler};
pub use registry::{Subscription, SubscriptionRegistry};
pub use types::PushEvent;
