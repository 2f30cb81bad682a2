//! Shared holder for the current [`AppState`].
//!
//! # Design Decisions
//! - State lives in a `tokio::sync::watch` channel; subscribers see the
//!   latest snapshot, intermediate states may be skipped
//! - All writes go through [`reduce`]

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tokio::sync::watch;

use crate::cache::persisted::now_millis;
use crate::cache::{DataConsistencyManager, FetchOptions};
use crate::error::QueryResult;
use crate::state::model::{AppState, Slice};
use crate::state::reducer::{reduce, AppAction};

/// Clears a slice's loading flag when the load settles or is dropped.
struct LoadingGuard<'a> {
    store: &'a StateStore,
    slice: Slice,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.dispatch(AppAction::SetLoading {
            slice: self.slice,
            loading: false,
        });
    }
}

#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<AppState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

impl StateStore {
    pub fn new(initial: AppState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn dispatch(&self, action: AppAction) {
        tracing::trace!(action = action.name(), "Dispatching action");
        self.tx.send_modify(|state| *state = reduce(state, action));
    }

    pub fn snapshot(&self) -> AppState {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every future state change.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }

    /// Fetch `cache_key` through `manager` and record the outcome in `slice`.
    ///
    /// The loading flag brackets the fetch. On success `apply` turns the data
    /// into the action that stores it and the cache key is marked fresh; on
    /// failure the slice error holds a user-facing message and the error is
    /// returned.
    pub async fn load<T, F, Fut, A>(
        &self,
        manager: &DataConsistencyManager,
        slice: Slice,
        cache_key: &str,
        fetch: F,
        options: FetchOptions,
        apply: A,
    ) -> QueryResult<()>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
        A: FnOnce(T) -> AppAction,
    {
        self.dispatch(AppAction::SetLoading { slice, loading: true });
        let loading = LoadingGuard { store: self, slice };
        let result = manager.get_cached_or_fetch(cache_key, fetch, options).await;
        drop(loading);

        match result {
            Ok(data) => {
                self.dispatch(apply(data));
                self.dispatch(AppAction::SetError { slice, error: None });
                self.dispatch(AppAction::MarkCacheUpdated {
                    key: cache_key.to_string(),
                    at: now_millis(),
                });
                Ok(())
            }
            Err(e) => {
                let message = e.category().user_message().to_string();
                self.dispatch(AppAction::SetError {
                    slice,
                    error: Some(message),
                });
                Err(e)
            }
        }
    }
}
