//! `tether listen`: print push events

use super::connect;
use crate::console::CliConsole;
use crate::signal_handler::SignalHandler;
use colored::*;
use tether_core::{BridgeConfig, BridgeEvent, Frame, Framer};
use tether_sdk::message_types::EDITOR_EVENTS;
use tokio::sync::broadcast::error::RecvError;

/// One status line per lifecycle event
pub fn describe(event: &BridgeEvent) -> String {
    match event {
        BridgeEvent::Connected => "connected".to_string(),
        BridgeEvent::Disconnected { reason, rejected } => {
            format!("disconnected: {reason} ({rejected} pending rejected)")
        }
        BridgeEvent::Reconnecting { attempt, delay } => {
            format!("reconnecting, attempt {attempt} in {}ms", delay.as_millis())
        }
        BridgeEvent::DecodeError { reason } => format!("dropped malformed frame: {reason}"),
        BridgeEvent::UnmatchedReply {
            message_id,
            message_type,
        } => format!("late reply {message_type} #{message_id}"),
        BridgeEvent::Closed => "closed".to_string(),
    }
}

pub async fn run(config: BridgeConfig, types: Vec<String>) -> anyhow::Result<()> {
    let console = CliConsole::new(true);
    let types = if types.is_empty() {
        EDITOR_EVENTS.iter().map(|t| t.to_string()).collect()
    } else {
        types
    };

    let bridge = connect(config).await?;
    let signals = SignalHandler::start()?;
    let interrupted = signals.token();
    let mut lifecycle = bridge.events();

    let framer = Framer::new();
    let subscriptions: Vec<_> = types
        .iter()
        .map(|message_type| {
            bridge.on_fn(message_type, move |event| {
                let frame = Frame {
                    message_type: event.message_type.clone(),
                    data: event.data.clone(),
                    message_id: event.message_id.clone(),
                };
                match framer.encode(&frame) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "cannot print push event"),
                }
            })
        })
        .collect();
    console.info(&format!("Listening for {}", types.join(", ")));

    loop {
        tokio::select! {
            _ = interrupted.cancelled() => break,
            event = lifecycle.recv() => match event {
                Ok(BridgeEvent::Closed) => {
                    console.warn("Connection closed");
                    break;
                }
                Ok(event) => eprintln!("{} {}", "•".dimmed(), describe(&event).dimmed()),
                Err(RecvError::Lagged(n)) => tracing::debug!(skipped = n, "lifecycle events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    bridge.close().await;
    Ok(())
}
