//! Request de-duplication.
//!
//! # Responsibilities
//! - Collapse concurrent requests for the same key into one underlying call
//! - Hand every waiting caller the same success value or the same error
//! - Forget the key as soon as the call settles
//!
//! # Design Decisions
//! - The registry holds a `Shared` future per key; joining is a clone
//! - The underlying call is spawned, so it settles even if every caller
//!   stops waiting, and the registry never keeps a stale entry
//! - Entries carry a generation id so a settling request cannot evict a
//!   newer request registered under the same key after `cancel_all`

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

use crate::error::QueryResult;
use crate::observability::metrics;

type SharedRequest<T> = Shared<BoxFuture<'static, QueryResult<T>>>;

/// An in-flight request registered under a key.
struct PendingRequest<T> {
    id: u64,
    future: SharedRequest<T>,
    started_at: Instant,
}

/// Removes a registry entry when the owning request settles or unwinds.
struct PendingGuard<T> {
    registry: Arc<DashMap<String, PendingRequest<T>>>,
    key: String,
    id: u64,
}

impl<T> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        self.registry.remove_if(&self.key, |_, pending| pending.id == self.id);
    }
}

/// Keyed in-flight request registry.
pub struct RequestDeduplicator<T> {
    registry: Arc<DashMap<String, PendingRequest<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for RequestDeduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("active", &self.registry.len())
            .finish()
    }
}

impl<T> RequestDeduplicator<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of keys with a request in flight.
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn active_keys(&self) -> Vec<String> {
        self.registry.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.registry.contains_key(key)
    }

    /// Age of the oldest in-flight request, if any.
    pub fn oldest_pending(&self) -> Option<std::time::Duration> {
        self.registry.iter().map(|e| e.value().started_at.elapsed()).max()
    }

    /// Forget every in-flight request.
    ///
    /// Bookkeeping only: the underlying calls keep running and their current
    /// waiters still receive the result. New callers start fresh requests.
    pub fn cancel_all(&self) {
        let dropped = self.registry.len();
        self.registry.clear();
        tracing::debug!(dropped, "Cleared in-flight request registry");
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Run `f` for `key`, or join the request already in flight for it.
    pub async fn execute<F, Fut>(&self, key: &str, f: F) -> QueryResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        let request = match self.registry.entry(key.to_string()) {
            Entry::Occupied(pending) => {
                metrics::record_dedup(true);
                tracing::trace!(key = %key, "Joining in-flight request");
                pending.get().future.clone()
            }
            Entry::Vacant(slot) => {
                metrics::record_dedup(false);
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let guard = PendingGuard {
                    registry: Arc::clone(&self.registry),
                    key: key.to_string(),
                    id,
                };
                let future = async move {
                    let _guard = guard;
                    f().await
                }
                .boxed()
                .shared();

                slot.insert(PendingRequest {
                    id,
                    future: future.clone(),
                    started_at: Instant::now(),
                });
                // Drives the request to completion independently of its callers.
                tokio::spawn(future.clone());
                future
            }
        };

        request.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_invocation() {
        let dedup = Arc::new(RequestDeduplicator::<u32>::new());
        let calls = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let dedup = dedup.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    dedup
                        .execute("team_members_7", move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(7)
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.active_count(), 0);
    }

    #[tokio::test]
    async fn test_error_shared_and_entry_removed() {
        let dedup = RequestDeduplicator::<u32>::new();
        let (a, b) = tokio::join!(
            dedup.execute("k", || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(QueryError::message("relation does not exist"))
            }),
            dedup.execute("k", || async { Ok(1) }),
        );

        assert_eq!(a.unwrap_err().to_string(), "relation does not exist");
        assert_eq!(b.unwrap_err().to_string(), "relation does not exist");
        assert!(!dedup.is_pending("k"));

        // Settled: the next call runs again.
        assert_eq!(dedup.execute("k", || async { Ok(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancel_all_only_clears_bookkeeping() {
        let dedup = Arc::new(RequestDeduplicator::<&'static str>::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let waiter = {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                dedup
                    .execute("slow", move || async move {
                        let _ = rx.await;
                        Ok("first")
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        while !dedup.is_pending("slow") {
            tokio::task::yield_now().await;
        }
        assert_eq!(dedup.active_keys(), vec!["slow".to_string()]);

        dedup.cancel_all();
        assert_eq!(dedup.active_count(), 0);

        // A new caller starts a fresh request instead of joining.
        let second = dedup.execute("slow", || async { Ok("second") }).await;
        assert_eq!(second.unwrap(), "second");

        tx.send(()).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "first");
        assert_eq!(dedup.active_count(), 0);
    }

    #[tokio::test]
    async fn test_request_settles_without_waiters() {
        let dedup = Arc::new(RequestDeduplicator::<u32>::new());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let caller = {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                dedup
                    .execute("orphan", move || async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(1)
                    })
                    .await
            })
        };
        while !dedup.is_pending("orphan") {
            tokio::task::yield_now().await;
        }
        caller.abort();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dedup.is_pending("orphan"));
    }
}
