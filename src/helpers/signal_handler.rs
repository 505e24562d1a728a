use anyhow::{Context, Result};
use log::info;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Turns termination signals into a cancelled [CancellationToken].
pub struct SignalHandler {
    tok: CancellationToken,
}

pub fn new() -> SignalHandler {
    SignalHandler {
        tok: CancellationToken::new(),
    }
}

impl SignalHandler {
    pub fn subscribe_stop(&self) -> CancellationToken {
        self.tok.clone()
    }

    /// Resolves once a signal was received (and the token cancelled), or once the token
    /// was cancelled from elsewhere, whichever happens first.
    pub async fn wait_for_signal(self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM")?;
        let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT")?;
        let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP")?;

        select! {
            _ = sigterm.recv() => info!("Terminated; stopping..."),
            _ = sigint.recv() => info!("Interrupted; stopping..."),
            _ = sighup.recv() => info!("Hangup received; stopping..."), // used by tmux apparently
            _ = self.tok.cancelled() => return Ok(()),
        }
        self.tok.cancel();
        Ok(())
    }
}
