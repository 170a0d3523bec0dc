//! Host-side handler traits

use crate::error::BridgeResult;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;

/// Handles a message type entirely on the host side
#[async_trait]
pub trait LocalHandler: Send + Sync {
    /// Produce the reply payload for `data`
    async fn handle(&self, data: Value) -> BridgeResult<Value>;
}

/// Transforms a remote-bound call before sending and its replies after
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Rewrite the outbound payload
    async fn before_send(&self, message_type: &str, data: Value) -> BridgeResult<Value> {
        let _ = message_type;
        Ok(data)
    }

    /// Rewrite a reply or chunk payload before the caller sees it
    fn after_reply(&self, message_type: &str, data: Value) -> BridgeResult<Value> {
        let _ = message_type;
        Ok(data)
    }
}

/// [`LocalHandler`] backed by an async closure
pub struct FnLocalHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnLocalHandler<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<Value>> + Send,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> LocalHandler for FnLocalHandler<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<Value>> + Send,
{
    async fn handle(&self, data: Value) -> BridgeResult<Value> {
        (self.f)(data).await
    }
}
