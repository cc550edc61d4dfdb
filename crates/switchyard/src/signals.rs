//! Signal handling for graceful shutdown.

use std::future::Future;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How a serving process came to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Signal,
    Stopped,
}

/// Races `signal` against `shutdown`, returning whichever finished first.
pub async fn wait_for_stop<F>(signal: F, shutdown: &CancellationToken) -> std::io::Result<StopCause>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = signal => result.map(|()| StopCause::Signal),
        _ = shutdown.cancelled() => Ok(StopCause::Stopped),
    }
}

/// Waits for a termination signal.
///
/// * **Unix platforms**: SIGINT and SIGTERM
/// * **Windows**: Ctrl+C
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    #[tokio::test]
    async fn cancelled_token_ends_the_wait() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let cause = wait_for_stop(pending::<std::io::Result<()>>(), &shutdown)
            .await
            .unwrap();
        assert_eq!(cause, StopCause::Stopped);
    }

    #[tokio::test]
    async fn signal_wins_over_live_token() {
        let shutdown = CancellationToken::new();
        let cause = wait_for_stop(async { Ok(()) }, &shutdown).await.unwrap();
        assert_eq!(cause, StopCause::Signal);
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn signal_install_errors_surface() {
        let shutdown = CancellationToken::new();
        let result = wait_for_stop(
            async { Err(std::io::Error::other("no signals")) },
            &shutdown,
        )
        .await;
        assert!(result.is_err());
    }
}
