//! Shutdown coordination for background tasks.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let notified = self.tx.send(()).unwrap_or(0);
        tracing::info!(tasks = notified, "Shutdown triggered");
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for `tasks` to finish, aborting whatever is left after `deadline`.
    ///
    /// Returns the number of tasks that finished on their own.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, deadline: Duration) -> usize {
        let total = tasks.len();
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();

        let joined = tokio::time::timeout(deadline, futures_util::future::join_all(tasks)).await;
        match joined {
            Ok(results) => {
                let finished = results.iter().filter(|r| r.is_ok()).count();
                tracing::info!(finished, total, "Background tasks drained");
                finished
            }
            Err(_) => {
                let finished = aborts.iter().filter(|a| a.is_finished()).count();
                for handle in &aborts {
                    handle.abort();
                }
                tracing::warn!(
                    finished,
                    aborted = total - finished,
                    deadline_ms = deadline.as_millis() as u64,
                    "Shutdown deadline reached, aborting remaining tasks"
                );
                finished
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_notified() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);

        shutdown.trigger();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_stragglers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let polite = tokio::spawn(async move {
            let _ = rx.recv().await;
        });
        let stubborn = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        shutdown.trigger();
        let finished = shutdown.drain(vec![polite, stubborn], Duration::from_secs(5)).await;
        assert_eq!(finished, 1);
    }
}
