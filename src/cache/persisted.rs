//! Persisted cache tier for static data.
//!
//! Entries live under `cache_<cacheKey>` as JSON `{data, expiresAt, timestamp}`
//! with epoch-millisecond timestamps. There is no versioning: a change in the
//! shape of `data` surfaces as a decode failure, which the manager treats as
//! a miss.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::store::{PersistentStore, StoreError};

pub const KEY_PREFIX: &str = "cache_";

/// Stored layout of a persisted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub data: Value,
    pub expires_at: u64,
    pub timestamp: u64,
}

impl PersistedEntry {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Typed view over a [`PersistentStore`].
#[derive(Clone)]
pub struct PersistedTier {
    store: Arc<dyn PersistentStore>,
}

impl std::fmt::Debug for PersistedTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedTier").finish_non_exhaustive()
    }
}

impl PersistedTier {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    pub fn storage_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Live value for `key`. Expired entries are evicted and read as `None`;
    /// undecodable entries are evicted and reported as an error.
    pub fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let storage_key = Self::storage_key(key);
        let Some(raw) = self.store.get(&storage_key)? else {
            return Ok(None);
        };

        let entry: PersistedEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                self.store.remove(&storage_key)?;
                return Err(e.into());
            }
        };

        if entry.is_expired_at(now_millis()) {
            self.store.remove(&storage_key)?;
            return Ok(None);
        }
        Ok(Some(entry.data))
    }

    pub fn write(&self, key: &str, data: &Value, ttl: Duration) -> Result<(), StoreError> {
        let now = now_millis();
        let entry = PersistedEntry {
            data: data.clone(),
            expires_at: now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            timestamp: now,
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.set(&Self::storage_key(key), &raw)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.store.remove(&Self::storage_key(key))
    }

    /// Cache keys (without prefix) currently persisted.
    pub fn cache_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }
}
