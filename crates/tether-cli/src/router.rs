//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands;
use tether_core::BridgeConfig;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli, config: BridgeConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Request {
            message_type,
            data,
            timeout,
        } => commands::call::request(config, &message_type, &data, timeout).await,
        Commands::Stream {
            message_type,
            data,
            raw,
        } => commands::call::stream(config, &message_type, &data, raw).await,
        Commands::Post { message_type, data } => {
            commands::call::post(config, &message_type, &data).await
        }
        Commands::Listen { types } => commands::listen::run(config, types).await,
        Commands::Relay { forward } => commands::relay::execute(config, forward).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&cli.config_file, &config),
            ConfigAction::Init { force } => commands::config::init(&cli.config_file, force),
        },
    }
}
