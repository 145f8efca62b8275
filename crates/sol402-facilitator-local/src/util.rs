//! Process-level utilities: tracing setup and signal-driven shutdown.

use std::io;
use tokio_util::sync::CancellationToken;

/// Initializes the global tracing subscriber.
///
/// Respects `RUST_LOG`; defaults to `info` when unset.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Translates SIGINT/SIGTERM into a [`CancellationToken`] for graceful
/// shutdown.
pub struct SigDown {
    token: CancellationToken,
}

impl SigDown {
    /// Installs the signal listeners. Must run inside a tokio runtime.
    pub fn try_new() -> io::Result<Self> {
        let token = CancellationToken::new();
        let cancel = token.clone();
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
                tracing::info!("shutdown signal received");
                cancel.cancel();
            });
        }
        #[cfg(not(unix))]
        {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown signal received");
                    cancel.cancel();
                }
            });
        }
        Ok(Self { token })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}
