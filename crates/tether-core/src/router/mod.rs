//! Routing of outgoing calls
//!
//! Every outgoing call is classified once, at send time:
//!
//! 1. a registered [`Interceptor`] makes it [`RouteDecision::Intercepted`]
//! 2. membership in the pass-through list makes it [`RouteDecision::Remote`]
//! 3. a registered [`LocalHandler`] makes it [`RouteDecision::Local`]
//! 4. otherwise the configured [`DefaultRoute`] applies
//!
//! With no rule and a `reject` default the call is unroutable.

pub mod allow_list;
pub mod handlers;

pub use allow_list::{DEFAULT_PASS_THROUGH, PassThroughList, default_pass_through};
pub use handlers::{FnLocalHandler, Interceptor, LocalHandler};

use crate::config::RoutingConfig;
use crate::error::{BridgeError, BridgeResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Where a call is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    /// Handled on the host side only
    Local,
    /// Forwarded verbatim to the assistant service
    Remote,
    /// Forwarded after host-side inspection or mutation
    Intercepted,
}

impl RouteDecision {
    /// Whether the call leaves the host
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
            Self::Intercepted => write!(f, "intercepted"),
        }
    }
}

/// Fallback for types with no routing rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultRoute {
    /// Unknown types are unroutable
    #[default]
    Reject,
    /// Unknown types are forwarded to the assistant service
    Remote,
}

/// A routing decision with the host-side collaborator it needs
#[derive(Clone)]
pub enum Route {
    /// Run a local handler
    Local(Arc<dyn LocalHandler>),
    /// Forward untouched
    Remote,
    /// Forward through an interceptor
    Intercepted(Arc<dyn Interceptor>),
}

impl Route {
    /// The bare decision
    pub fn decision(&self) -> RouteDecision {
        match self {
            Self::Local(_) => RouteDecision::Local,
            Self::Remote => RouteDecision::Remote,
            Self::Intercepted(_) => RouteDecision::Intercepted,
        }
    }

    /// Interceptor for this route, if any
    pub fn interceptor(&self) -> Option<Arc<dyn Interceptor>> {
        match self {
            Self::Intercepted(i) => Some(i.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route({})", self.decision())
    }
}

/// Message router
pub struct Router {
    pass_through: PassThroughList,
    default_route: DefaultRoute,
    local: RwLock<HashMap<String, Arc<dyn LocalHandler>>>,
    interceptors: RwLock<HashMap<String, Arc<dyn Interceptor>>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(PassThroughList::default(), DefaultRoute::default())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("pass_through", &self.pass_through.len())
            .field("default_route", &self.default_route)
            .field("local", &self.local.read().len())
            .field("interceptors", &self.interceptors.read().len())
            .finish()
    }
}

impl Router {
    /// Create a router with no handlers
    pub fn new(pass_through: PassThroughList, default_route: DefaultRoute) -> Self {
        Self {
            pass_through,
            default_route,
            local: RwLock::new(HashMap::new()),
            interceptors: RwLock::new(HashMap::new()),
        }
    }

    /// Create a router from routing configuration
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self::new(
            PassThroughList::new(config.pass_through.iter().cloned()),
            config.default_route,
        )
    }

    /// Register a host-side handler for `message_type`
    pub fn register_local(
        &self,
        message_type: impl Into<String>,
        handler: Arc<dyn LocalHandler>,
    ) -> BridgeResult<()> {
        let message_type = message_type.into();
        self.check_type(&message_type)?;
        if self.pass_through.contains(&message_type) {
            return Err(BridgeError::invalid_registration(format!(
                "'{}' is a pass-through type and cannot be handled locally",
                message_type
            )));
        }
        let mut local = self.local.write();
        if local.contains_key(&message_type) {
            return Err(BridgeError::invalid_registration(format!(
                "a local handler for '{}' is already registered",
                message_type
            )));
        }
        debug!(message_type = %message_type, "registered local handler");
        local.insert(message_type, handler);
        Ok(())
    }

    /// Register an async closure as the local handler for `message_type`
    pub fn register_local_fn<F, Fut>(&self, message_type: impl Into<String>, f: F) -> BridgeResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
    {
        self.register_local(message_type, Arc::new(FnLocalHandler::new(f)))
    }

    /// Remove the local handler for `message_type`
    pub fn unregister_local(&self, message_type: &str) -> bool {
        self.local.write().remove(message_type).is_some()
    }

    /// Register an interceptor for `message_type`
    pub fn register_interceptor(
        &self,
        message_type: impl Into<String>,
        interceptor: Arc<dyn Interceptor>,
    ) -> BridgeResult<()> {
        let message_type = message_type.into();
        self.check_type(&message_type)?;
        let mut interceptors = self.interceptors.write();
        if interceptors.contains_key(&message_type) {
            return Err(BridgeError::invalid_registration(format!(
                "an interceptor for '{}' is already registered",
                message_type
            )));
        }
        debug!(message_type = %message_type, "registered interceptor");
        interceptors.insert(message_type, interceptor);
        Ok(())
    }

    /// Remove the interceptor for `message_type`
    pub fn unregister_interceptor(&self, message_type: &str) -> bool {
        self.interceptors.write().remove(message_type).is_some()
    }

    fn check_type(&self, message_type: &str) -> BridgeResult<()> {
        if message_type.trim().is_empty() {
            return Err(BridgeError::invalid_registration("message type must not be empty"));
        }
        Ok(())
    }

    /// Classify an outgoing call
    pub fn decide(&self, message_type: &str) -> BridgeResult<RouteDecision> {
        self.route(message_type).map(|r| r.decision())
    }

    /// Classify an outgoing call and return its collaborator
    pub fn route(&self, message_type: &str) -> BridgeResult<Route> {
        if let Some(interceptor) = self.interceptors.read().get(message_type) {
            return Ok(Route::Intercepted(interceptor.clone()));
        }
        if self.pass_through.contains(message_type) {
            return Ok(Route::Remote);
        }
        if let Some(handler) = self.local.read().get(message_type) {
            return Ok(Route::Local(handler.clone()));
        }
        match self.default_route {
            DefaultRoute::Remote => Ok(Route::Remote),
            DefaultRoute::Reject => Err(BridgeError::unroutable(message_type)),
        }
    }

    /// Local handler for inbound reverse requests
    pub fn local_handler(&self, message_type: &str) -> Option<Arc<dyn LocalHandler>> {
        self.local.read().get(message_type).cloned()
    }

    /// Whether `message_type` is on the pass-through list
    pub fn is_pass_through(&self, message_type: &str) -> bool {
        self.pass_through.contains(message_type)
    }

    /// The pass-through list
    pub fn pass_through(&self) -> &PassThroughList {
        &self.pass_through
    }
}
