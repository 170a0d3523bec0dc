//! One-shot `request`, `stream` and `post`

use super::{connect, parse_data};
use crate::console::CliConsole;
use crate::signal_handler::SignalHandler;
use futures::StreamExt;
use serde_json::Value;
use std::io::Write;
use std::time::Duration;
use tether_core::{BridgeConfig, BridgeError, RequestOptions};

/// Describe a bridge error the way a person at a terminal needs it
fn explain(e: BridgeError) -> anyhow::Error {
    anyhow::anyhow!("{} [{}]", e.user_message(), e.error_code())
}

/// Printable text of a chunk: a bare string, its `content`, or the JSON itself
pub fn chunk_text(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("content") {
            Some(Value::String(s)) => s.clone(),
            _ => data.to_string(),
        },
        _ => data.to_string(),
    }
}

pub async fn request(
    config: BridgeConfig,
    message_type: &str,
    data: &str,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let data = parse_data(data)?;
    let bridge = connect(config).await?;

    let mut options = RequestOptions::new();
    if let Some(timeout) = timeout {
        options = options.with_timeout(timeout);
    }
    let result = bridge.request_with(message_type, data, options).await;
    bridge.close().await;

    let reply = result.map_err(explain)?;
    println!("{}", serde_json::to_string_pretty(&reply.data)?);
    Ok(())
}

pub async fn stream(config: BridgeConfig, message_type: &str, data: &str, raw: bool) -> anyhow::Result<()> {
    let console = CliConsole::new(config.logging.level == "debug");
    let data = parse_data(data)?;
    let bridge = connect(config).await?;
    let signals = SignalHandler::start()?;
    let interrupted = signals.token();

    let mut chunks = bridge.stream(message_type, data);
    let id = chunks.id().clone();
    let mut stdout = std::io::stdout();
    let mut outcome = Ok(());
    let mut aborting = false;

    loop {
        tokio::select! {
            _ = interrupted.cancelled(), if !aborting => {
                aborting = true;
                bridge.abort(&id);
            }
            next = chunks.next() => match next {
                Some(Ok(frame)) => {
                    if raw {
                        writeln!(stdout, "{}", frame.data)?;
                    } else {
                        write!(stdout, "{}", chunk_text(&frame.data))?;
                    }
                    stdout.flush()?;
                }
                Some(Err(BridgeError::Cancelled)) => {
                    console.warn("Stream aborted");
                    break;
                }
                Some(Err(e)) => {
                    outcome = Err(explain(e));
                    break;
                }
                None => break,
            }
        }
    }
    if !raw {
        writeln!(stdout)?;
    }
    if let Some(completion) = chunks.completion() {
        console.info(&format!("completion: {completion}"));
    }

    drop(chunks);
    bridge.close().await;
    outcome
}

pub async fn post(config: BridgeConfig, message_type: &str, data: &str) -> anyhow::Result<()> {
    let data = parse_data(data)?;
    let bridge = connect(config).await?;
    let result = bridge.post(message_type, data).await;
    bridge.close().await;
    result.map_err(explain)?;
    CliConsole::new(true).success(&format!("Posted {message_type}"));
    Ok(())
}
