//! Stop requests for a backup run.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the run token. Timeline and
//! friends passes notice it before requesting their next page, and the photo
//! pool stops handing out files while the ones already streaming finish. A
//! second signal exits immediately.

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Exit status for a forced stop, as a shell reports death by SIGINT.
const FORCE_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopRequest {
    /// Finish the current page or downloads, then wind down.
    Graceful,
    /// The user asked twice; don't wait.
    Forced,
}

/// Decide what the `received`-th signal (1-based) means for the run.
fn escalate(received: u32, token: &CancellationToken) -> StopRequest {
    if received <= 1 {
        token.cancel();
        StopRequest::Graceful
    } else {
        StopRequest::Forced
    }
}

struct StopSignals {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    hangup: Signal,
}

impl StopSignals {
    #[cfg(unix)]
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    #[cfg(not(unix))]
    fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Name of the next stop signal, or `None` once no source can deliver one.
    #[cfg(unix)]
    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.ok().map(|_| "SIGINT"),
            s = self.terminate.recv() => s.map(|_| "SIGTERM"),
            s = self.hangup.recv() => s.map(|_| "SIGHUP"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<&'static str> {
        tokio::signal::ctrl_c().await.ok().map(|_| "Ctrl+C")
    }
}

/// Spawn the signal listener and return the token it cancels.
///
/// If the listeners can't be registered the run proceeds without graceful
/// stop support.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let run_token = token.clone();

    tokio::spawn(async move {
        let mut signals = match StopSignals::register() {
            Ok(signals) => signals,
            Err(e) => {
                tracing::warn!("Cannot listen for stop signals: {}", e);
                return;
            }
        };

        let mut received = 0u32;
        while let Some(name) = signals.recv().await {
            received += 1;
            match escalate(received, &run_token) {
                StopRequest::Graceful => {
                    tracing::info!(
                        "Received {}, stopping after the current page or photo downloads",
                        name
                    );
                    tracing::info!("Send it again to exit immediately");
                }
                StopRequest::Forced => {
                    tracing::warn!("Received {} again, exiting without cleanup", name);
                    std::process::exit(FORCE_EXIT_CODE);
                }
            }
        }
    });

    token
}
