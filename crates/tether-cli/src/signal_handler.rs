//! Ctrl+C handling
//!
//! SIGINT and SIGTERM cancel a token instead of killing the process, so the
//! running command can abort its exchange and close the bridge cleanly.

use futures::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels its token on the first interrupt; stops listening on drop
pub struct SignalHandler {
    token: CancellationToken,
    handle: Handle,
    task: JoinHandle<()>,
}

impl SignalHandler {
    /// Start listening for SIGINT and SIGTERM
    pub fn start() -> std::io::Result<Self> {
        let signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let token = CancellationToken::new();

        let cancel = token.clone();
        let task = tokio::spawn(async move {
            let mut signals = signals;
            while let Some(signal) = signals.next().await {
                tracing::debug!(signal, "interrupt received");
                if cancel.is_cancelled() {
                    // second Ctrl+C
                    std::process::exit(130);
                }
                cancel.cancel();
            }
        });

        Ok(Self {
            token,
            handle,
            task,
        })
    }

    /// Token cancelled on interrupt
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.handle.close();
        self.task.abort();
    }
}
