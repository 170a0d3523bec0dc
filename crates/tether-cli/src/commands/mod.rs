//! CLI commands

pub mod call;
pub mod config;
pub mod listen;
pub mod relay;

use crate::args::Cli;
use anyhow::Context;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tether_core::{Bridge, BridgeConfig, ConfigLoader};

/// Effective configuration: defaults, then the file, environment and flags
pub fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut args = HashMap::new();
    if let Some(url) = &cli.url {
        args.insert("url".to_string(), url.clone());
    }
    ConfigLoader::new()
        .with_defaults()
        .with_file(expand_home(&cli.config_file))
        .with_env()
        .with_args(args)
        .load_unvalidated()
        .with_context(|| format!("loading configuration from '{}'", cli.config_file))
}

/// Resolve a leading `~/` against the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Connect the configured transport
pub async fn connect(config: BridgeConfig) -> anyhow::Result<Bridge> {
    let target = config
        .transport
        .url
        .clone()
        .unwrap_or_else(|| config.transport.kind.to_string());
    Bridge::from_config(config)
        .await
        .with_context(|| format!("connecting to {target}"))
}

/// Parse a `--data` argument
pub fn parse_data(data: &str) -> anyhow::Result<Value> {
    serde_json::from_str(data).with_context(|| format!("--data is not valid JSON: {data}"))
}
