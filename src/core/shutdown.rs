//! Termination signal wait.
//!
//! Unix: `SIGINT`, `SIGTERM`, `SIGQUIT` and Ctrl-C. Elsewhere: Ctrl-C only.

/// Completes when the process receives a termination signal.
///
/// Returns the signal name, or `Err` if a listener could not be registered.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
        r = tokio::signal::ctrl_c() => { r?; "ctrl-c" }
    };
    Ok(name)
}

/// Completes when the process receives Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
