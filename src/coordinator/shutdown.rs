//! # OS termination signals.
//!
//! [`wait_for_termination_signal`] completes when the process is asked to
//! stop, so callers can hand control to
//! [`Coordinator::shutdown`](crate::Coordinator::shutdown).
//!
//! ## Signals
//! **Unix:** `SIGINT` (Ctrl-C), `SIGTERM` (systemd/Kubernetes stop),
//! `SIGQUIT`.
//!
//! **Elsewhere:** `Ctrl-C` via [`tokio::signal::ctrl_c`].

/// Waits for a termination signal.
///
/// Each call installs independent listeners, so concurrent waiters are fine.
/// Returns `Err` only when listener registration itself fails.
#[cfg(unix)]
pub(crate) async fn wait_for_termination_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
        _ = sigquit.recv() => {}
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Each call installs independent listeners, so concurrent waiters are fine.
/// Returns `Err` only when listener registration itself fails.
#[cfg(not(unix))]
pub(crate) async fn wait_for_termination_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
