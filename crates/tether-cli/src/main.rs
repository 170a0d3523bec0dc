//! Tether CLI
//!
//! Talks to the assistant service through the same bridge editor surfaces
//! use, for scripting and debugging.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/tether-cli
//! ```
//!
//! # Examples
//!
//! ```bash
//! tether --url ws://localhost:3000 request history/list
//! tether stream llm/streamChat --data '{"messages":[{"role":"user","content":"hi"}]}'
//! tether listen -t indexProgress
//! tether relay < ui_frames.jsonl
//! ```

mod args;
mod commands;
mod console;
mod logging;
mod router;
mod signal_handler;

use clap::Parser;

pub use args::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(&cli)?;
    logging::init(&config.logging, cli.verbose);
    router::route(cli, config).await
}
