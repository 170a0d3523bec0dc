//! Reconnect policy

pub mod backoff;

pub use backoff::{BackoffStrategy, ExponentialBackoff, ReconnectConfig};
