//! Bridge configuration model

use super::logging_config::LoggingConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{IdStrategy, TerminationRules};
use crate::recovery::ReconnectConfig;
use crate::router::{DefaultRoute, default_pass_through};
use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Routing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Types always forwarded untouched
    pub pass_through: Vec<String>,
    /// What to do with types that have no rule
    pub default_route: DefaultRoute,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            pass_through: default_pass_through(),
            default_route: DefaultRoute::default(),
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Which transport to use
    pub kind: TransportKind,
    /// Service URL for the websocket transport
    pub url: Option<String>,
    /// Outbound queue bound
    pub send_queue: usize,
    /// Reconnect policy
    pub reconnect: ReconnectConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            url: None,
            send_queue: 256,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Session handshake configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Message type requested once on connect; `None` skips the handshake
    pub handshake_type: Option<String>,
    /// How long to wait for the handshake reply
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_type: Some("getSessionId".to_string()),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Default deadline for `request`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Chunks buffered per stream before the producer is paced
    pub stream_buffer: usize,
    /// Closed ids remembered for late-reply detection
    pub closed_id_memory: usize,
    /// How fresh message ids are generated
    pub id_strategy: IdStrategy,
    /// Routing rules
    pub routing: RoutingConfig,
    /// Stream termination rules
    pub termination: TerminationRules,
    /// Transport settings
    pub transport: TransportConfig,
    /// Session handshake
    pub session: SessionConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stream_buffer: 64,
            closed_id_memory: crate::correlation::DEFAULT_CLOSED_ID_MEMORY,
            id_strategy: IdStrategy::default(),
            routing: RoutingConfig::default(),
            termination: TerminationRules::default(),
            transport: TransportConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Set the service URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.transport.url = Some(url.into());
        self
    }

    /// Disable the session handshake
    pub fn without_handshake(mut self) -> Self {
        self.session.handshake_type = None;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check the configuration, transport settings included
    pub fn validate(&self) -> BridgeResult<()> {
        self.validate_bridge()?;
        if self.transport.send_queue == 0 {
            return Err(BridgeError::config("transport.send_queue must be greater than zero"));
        }
        self.transport.reconnect.validate()?;
        if self.transport.kind == TransportKind::Websocket
            && self.transport.url.as_deref().is_none_or(str::is_empty)
        {
            return Err(BridgeError::config("transport.url is required for the websocket transport"));
        }
        Ok(())
    }

    /// Check the settings the bridge itself depends on
    pub fn validate_bridge(&self) -> BridgeResult<()> {
        if self.request_timeout.is_zero() {
            return Err(BridgeError::config("request_timeout must be greater than zero"));
        }
        if self.stream_buffer == 0 {
            return Err(BridgeError::config("stream_buffer must be greater than zero"));
        }
        if self.closed_id_memory == 0 {
            return Err(BridgeError::config("closed_id_memory must be greater than zero"));
        }
        if self.routing.pass_through.iter().any(|t| t.trim().is_empty()) {
            return Err(BridgeError::config("routing.pass_through contains an empty entry"));
        }
        if self.session.handshake_type.as_deref() == Some("") {
            return Err(BridgeError::config("session.handshake_type must not be empty"));
        }
        Ok(())
    }

    /// Write the configuration to `path`, format chosen by extension
    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::to_string_pretty(self)
                .map_err(|e| BridgeError::serialization(e.to_string()))?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)
                .map_err(|e| BridgeError::serialization(e.to_string()))?,
            _ => serde_json::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content).map_err(|e| {
            BridgeError::config_with_context(
                format!("Failed to write config file: {}", e),
                format!("Writing configuration to '{}'", path.display()),
            )
        })
    }
}
