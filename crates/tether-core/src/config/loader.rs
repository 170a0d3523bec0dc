//! Configuration loading
//!
//! Sources are applied in the order they were added; later sources override
//! earlier ones. A file source replaces the whole configuration (its missing
//! fields take defaults); environment and command line sources override
//! individual fields.

use super::bridge_config::BridgeConfig;
use super::logging_config::LogFormat;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::TransportKind;
use humantime_serde::re::humantime;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "tether_config.json";

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Configuration from a file
    File(PathBuf),
    /// Configuration from `TETHER_*` environment variables
    Environment,
    /// Overrides from command line arguments
    CommandLine(HashMap<String, String>),
    /// Default configuration
    Default,
}

/// Configuration loader with support for multiple sources
#[derive(Debug, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration source
    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    /// Add environment variables source
    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    /// Add command line overrides
    pub fn with_args(self, args: HashMap<String, String>) -> Self {
        self.add_source(ConfigSource::CommandLine(args))
    }

    /// Add default configuration source
    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    /// Load and validate configuration from all sources
    pub fn load(self) -> BridgeResult<BridgeConfig> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from all sources without validating it
    pub fn load_unvalidated(self) -> BridgeResult<BridgeConfig> {
        let mut config = BridgeConfig::default();
        for source in &self.sources {
            match source {
                ConfigSource::Default => {
                    tracing::debug!("Loading default config");
                    config = BridgeConfig::default();
                }
                ConfigSource::File(path) => {
                    tracing::debug!("Loading config from file: {}", path.display());
                    if let Some(file_config) = load_from_file(path)? {
                        config = file_config;
                    }
                }
                ConfigSource::Environment => {
                    tracing::debug!("Loading config from environment");
                    apply_overrides(&mut config, |key| env::var(key).ok(), ENV_KEYS)?;
                }
                ConfigSource::CommandLine(args) => {
                    tracing::debug!("Loading config from command line");
                    apply_overrides(&mut config, |key| args.get(key).cloned(), ARG_KEYS)?;
                }
            }
        }
        Ok(config)
    }
}

/// Load a configuration file; `None` if it does not exist
pub fn load_from_file(path: &Path) -> BridgeResult<Option<BridgeConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        BridgeError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| {
            BridgeError::config_with_context(
                format!("Failed to parse TOML config: {}", e),
                format!("Deserializing TOML configuration from '{}'", path.display()),
            )
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
            BridgeError::config_with_context(
                format!("Failed to parse YAML config: {}", e),
                format!("Deserializing YAML configuration from '{}'", path.display()),
            )
        })?,
        _ => serde_json::from_str(&content).map_err(|e| {
            BridgeError::config_with_context(
                format!("Failed to parse JSON config: {}", e),
                format!("Deserializing JSON configuration from '{}'", path.display()),
            )
        })?,
    };

    Ok(Some(config))
}

/// Field override keys, in the order (url, request_timeout, log_level,
/// log_format, pass_through, transport)
type OverrideKeys = [&'static str; 6];

const ENV_KEYS: OverrideKeys = [
    "TETHER_URL",
    "TETHER_REQUEST_TIMEOUT",
    "TETHER_LOG_LEVEL",
    "TETHER_LOG_FORMAT",
    "TETHER_PASS_THROUGH",
    "TETHER_TRANSPORT",
];

const ARG_KEYS: OverrideKeys = [
    "url",
    "request_timeout",
    "log_level",
    "log_format",
    "pass_through",
    "transport",
];

fn apply_overrides<F>(config: &mut BridgeConfig, lookup: F, keys: OverrideKeys) -> BridgeResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let [url, timeout, level, format, pass_through, transport] = keys;

    if let Some(value) = lookup(url) {
        config.transport.url = Some(value);
    }

    if let Some(value) = lookup(timeout) {
        config.request_timeout = humantime::parse_duration(&value)
            .map_err(|e| BridgeError::config(format!("Invalid {} value '{}': {}", timeout, value, e)))?;
    }

    if let Some(value) = lookup(level) {
        config.logging.level = value;
    }

    if let Some(value) = lookup(format) {
        config.logging.format = value
            .parse::<LogFormat>()
            .map_err(|e| BridgeError::config(format!("Invalid {} value: {}", format, e)))?;
    }

    if let Some(value) = lookup(pass_through) {
        config.routing.pass_through = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    if let Some(value) = lookup(transport) {
        config.transport.kind = match value.to_ascii_lowercase().as_str() {
            "websocket" | "ws" => TransportKind::Websocket,
            "stdio" => TransportKind::Stdio,
            other => {
                return Err(BridgeError::config(format!(
                    "Invalid {} value '{}': expected websocket or stdio",
                    transport, other
                )));
            }
        };
    }

    Ok(())
}

/// Load configuration from defaults, an optional file, then the environment
pub fn load_config(path: Option<&Path>) -> BridgeResult<BridgeConfig> {
    let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
    ConfigLoader::new()
        .with_defaults()
        .with_file(path)
        .with_env()
        .load()
}
