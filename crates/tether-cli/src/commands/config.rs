//! Configuration management commands

use super::expand_home;
use crate::console::CliConsole;
use anyhow::Context;
use colored::*;
use tether_core::BridgeConfig;

/// Print the effective configuration (file, environment and flags applied)
pub fn show(config_file: &str, config: &BridgeConfig) -> anyhow::Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration");

    let path = expand_home(config_file);
    if path.exists() {
        console.success(&format!("Loaded configuration from: {}", path.display()));
    } else {
        console.warn(&format!("Configuration file not found: {}", path.display()));
        console.info("Using defaults and environment");
    }

    eprintln!("{} {}", "Transport:".bold(), config.transport.kind);
    eprintln!(
        "{} {}",
        "URL:".bold(),
        config.transport.url.as_deref().unwrap_or("(not set)")
    );
    eprintln!(
        "{} {}",
        "Request timeout:".bold(),
        humantime_serde::re::humantime::format_duration(config.request_timeout)
    );
    eprintln!("{} {}", "Pass-through types:".bold(), config.routing.pass_through.len());
    if let Err(e) = config.validate() {
        console.warn(&e.user_message());
    }

    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Write a configuration file with defaults
pub fn init(config_file: &str, force: bool) -> anyhow::Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration Initialization");

    let path = expand_home(config_file);
    if path.exists() && !force {
        console.error(&format!("Configuration file already exists: {}", path.display()));
        console.info("Use --force to overwrite");
        anyhow::bail!("configuration file already exists");
    }

    BridgeConfig::default()
        .with_url("ws://localhost:65432")
        .save(&path)
        .with_context(|| format!("writing {}", path.display()))?;

    console.success(&format!("Created configuration file: {}", path.display()));
    console.info("Edit transport.url to point at your assistant service");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::load_from_file;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.json");
        let path_str = path.to_str().unwrap();

        init(path_str, false).unwrap();
        let written = load_from_file(&path).unwrap().unwrap();
        assert!(written.validate().is_ok());

        assert!(init(path_str, false).is_err());
        assert!(init(path_str, true).is_ok());
    }
}
