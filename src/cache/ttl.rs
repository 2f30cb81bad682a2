//! Keyed result cache with per-entry expiry.
//!
//! # Design Decisions
//! - `DashMap` behind an `Arc` so clones share one store (fetch tasks
//!   write results back from spawned futures)
//! - Expired entries are never returned; the read that finds one evicts it
//! - A periodic sweep removes entries nobody reads again

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Expiry used when `now + ttl` does not fit in an `Instant` (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// A cached value and its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            data,
            stored_at: now,
            expires_at: now
                .checked_add(ttl)
                .or_else(|| now.checked_add(FAR_FUTURE))
                .unwrap_or(now),
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before expiry.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Counts of live and stale entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TtlStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
}

/// Thread-safe TTL cache.
#[derive(Debug)]
pub struct TtlCache<T> {
    entries: Arc<DashMap<String, CacheEntry<T>>>,
}

impl<T> Clone for TtlCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TtlCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, key: impl Into<String>, data: T, ttl: Duration) {
        self.entries.insert(key.into(), CacheEntry::new(data, ttl));
    }

    /// Remove `key`, returning whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key matching `pattern`; returns the number removed.
    pub fn remove_matching(&self, pattern: &Regex) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.is_match(key));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop all expired entries; returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> TtlStats {
        let mut stats = TtlStats::default();
        for entry in self.entries.iter() {
            stats.total += 1;
            if entry.value().is_expired() {
                stats.expired += 1;
            } else {
                stats.valid += 1;
            }
        }
        stats
    }
}

impl<T: Clone> TtlCache<T> {
    /// Valid value for `key`, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.data)
    }

    /// Valid entry for `key` including its timestamps.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(entry.clone());
            }
        }
        // Re-check under the write lock so a fresh insert racing us survives.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        None
    }

    /// Entry for `key` whether or not it has expired. Does not evict.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.get(key).map(|entry| entry.clone())
    }
}
