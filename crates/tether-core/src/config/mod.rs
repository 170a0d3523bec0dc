//! Configuration for the bridge
//!
//! [`BridgeConfig`] carries everything a bridge instance needs. Load it with
//! [`ConfigLoader`] from defaults, a JSON/TOML/YAML file and `TETHER_*`
//! environment variables.

pub mod bridge_config;
pub mod loader;
pub mod logging_config;

pub use bridge_config::{
    BridgeConfig, DEFAULT_REQUEST_TIMEOUT, RoutingConfig, SessionConfig, TransportConfig,
};
pub use loader::{ConfigLoader, ConfigSource, DEFAULT_CONFIG_FILE, load_config, load_from_file};
pub use logging_config::{LogFormat, LoggingConfig};
