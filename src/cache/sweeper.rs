//! Periodic expired-entry sweeps.
//!
//! # Responsibilities
//! - Run a sweep function on a fixed interval
//! - Stop when the shutdown broadcast fires

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

/// Spawn a task calling `sweep` every `interval` until shutdown.
///
/// `sweep` returns the number of entries it removed.
pub fn spawn_sweeper<F>(
    name: &'static str,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    sweep: F,
) -> JoinHandle<()>
where
    F: Fn() -> usize + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(cache = name, interval_secs = interval.as_secs(), "Cache sweeper starting");

        let mut ticker = time::interval(interval);
        // The first tick completes immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = sweep();
                    if removed > 0 {
                        tracing::debug!(cache = name, removed, "Swept expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!(cache = name, "Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_until_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = spawn_sweeper("test", Duration::from_secs(60), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
