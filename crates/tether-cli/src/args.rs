//! CLI argument definitions using clap
//!
//! - tether request <type>          # One request, print the reply
//! - tether stream <type>           # Streamed request, Ctrl+C aborts
//! - tether post <type>             # Fire-and-forget
//! - tether listen                  # Print push events
//! - tether relay                   # Bridge a UI surface on stdio
//! - tether config show|init        # Configuration files

use clap::{Parser, Subcommand};
use std::time::Duration;
use tether_core::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Tether - message bus between an editor surface and the assistant service")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (JSON, TOML or YAML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Assistant service URL, overrides the configuration file
    #[arg(long, global = true, env = "TETHER_URL")]
    pub url: Option<String>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a request and print its reply
    Request {
        /// Message type, e.g. history/list
        message_type: String,

        /// JSON payload
        #[arg(long, short, default_value = "{}")]
        data: String,

        /// Reply timeout, e.g. 30s or 2m
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Send a streamed request and print chunks as they arrive (Ctrl+C aborts)
    Stream {
        /// Message type, e.g. llm/streamChat
        message_type: String,

        /// JSON payload
        #[arg(long, short, default_value = "{}")]
        data: String,

        /// Print raw chunk payloads instead of their text
        #[arg(long)]
        raw: bool,
    },

    /// Send a one-way notification
    Post {
        /// Message type, e.g. devdata/log
        message_type: String,

        /// JSON payload
        #[arg(long, short, default_value = "null")]
        data: String,
    },

    /// Print push events until interrupted
    Listen {
        /// Message types to subscribe to (default: every editor event)
        #[arg(long = "type", short = 't')]
        types: Vec<String>,
    },

    /// Relay frames between a UI surface on stdin/stdout and the service
    Relay {
        /// Push event types forwarded to stdout (default: every editor event)
        #[arg(long = "forward", short = 'f')]
        forward: Vec<String>,
    },

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Display the effective configuration
    Show,

    /// Create a configuration file with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_arguments() {
        let cli = Cli::try_parse_from([
            "tether",
            "request",
            "history/list",
            "--timeout",
            "30s",
            "--url",
            "ws://localhost:3000",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("ws://localhost:3000"));
        assert_eq!(cli.config_file, DEFAULT_CONFIG_FILE);
        match cli.command {
            Commands::Request {
                message_type,
                data,
                timeout,
            } => {
                assert_eq!(message_type, "history/list");
                assert_eq!(data, "{}");
                assert_eq!(timeout, Some(Duration::from_secs(30)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_repeated_types() {
        let cli = Cli::try_parse_from(["tether", "listen", "-t", "userInput", "-t", "showDiff"]).unwrap();
        match cli.command {
            Commands::Listen { types } => assert_eq!(types, vec!["userInput", "showDiff"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        assert!(Cli::try_parse_from(["tether", "request", "x", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn test_config_init_flags() {
        let cli = Cli::try_parse_from(["tether", "--verbose", "config", "init", "--force"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }
}
