//! Push event handlers

use super::types::PushEvent;
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use tracing::warn;

/// Trait for handling push events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event
    async fn handle(&self, event: PushEvent) -> BridgeResult<()>;
}

/// Handler backed by a synchronous closure
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&PushEvent) + Send + Sync,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&PushEvent) + Send + Sync,
{
    async fn handle(&self, event: PushEvent) -> BridgeResult<()> {
        (self.f)(&event);
        Ok(())
    }
}

/// Handler that decodes the payload into `T` before calling an async closure
///
/// Payloads that do not match `T` are rejected with a decode error and the
/// closure is not called.
pub struct TypedHandler<T, F, Fut> {
    f: F,
    _marker: PhantomData<fn(T) -> Fut>,
}

impl<T, F, Fut> TypedHandler<T, F, Fut>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<()>> + Send,
{
    /// Pair a typed decoder with a handler
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> EventHandler for TypedHandler<T, F, Fut>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<()>> + Send,
{
    async fn handle(&self, event: PushEvent) -> BridgeResult<()> {
        let value = match event.decode::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!(message_type = %event.message_type, error = %e, "push payload does not match handler type");
                return Err(BridgeError::decode(format!(
                    "'{}' payload: {}",
                    event.message_type, e
                )));
            }
        };
        (self.f)(value).await
    }
}
