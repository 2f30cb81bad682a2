//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (all platforms) or SIGTERM (unix)
//! - Hand control back to `main`, which triggers the shutdown broadcast

/// Resolve when the process is asked to stop.
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("Received SIGINT");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C");
        Ok(())
    }
}
