//! Key/value backends for the persisted cache tier.
//!
//! # Responsibilities
//! - Provide a synchronous string store keyed like browser local storage
//! - Survive process restarts (`JsonFileStore`)
//! - Report failures as `StoreError` instead of panicking
//!
//! # Design Decisions
//! - The whole map is rewritten on each mutation (small, static data only)
//! - Writes go to a temp file then rename, so a crash never leaves half a file
//! - Entry quota mimics local-storage quota errors

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors raised by a persisted store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store quota exceeded ({limit} entries)")]
    QuotaExceeded { limit: usize },
}

/// Synchronous string key/value store.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

fn check_quota(entries: &DashMap<String, String>, key: &str, limit: usize) -> Result<(), StoreError> {
    if !entries.contains_key(key) && entries.len() >= limit {
        return Err(StoreError::QuotaExceeded { limit });
    }
    Ok(())
}

/// Process-local store. Clones share the same map, which lets tests model
/// a restart by handing the same store to a fresh manager.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
    max_entries: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_quota(usize::MAX)
    }

    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_quota(&self.entries, key, self.max_entries)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}

/// Store backed by a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: DashMap<String, String>,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open `path`, loading existing entries if the file exists.
    pub fn open(path: impl AsRef<Path>, max_entries: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = DashMap::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let map: BTreeMap<String, String> = serde_json::from_reader(reader)?;
            for (k, v) in map {
                entries.insert(k, v);
            }
            tracing::info!(path = %path.display(), entries = entries.len(), "Loaded persisted cache");
        }

        Ok(Self {
            path,
            entries,
            max_entries,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let map: BTreeMap<_, _> = self
            .entries
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &map)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PersistentStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_quota(&self.entries, key, self.max_entries)?;
        let previous = self.entries.insert(key.to_string(), value.to_string());
        self.flush().inspect_err(|_| match previous {
            Some(previous) => {
                self.entries.insert(key.to_string(), previous);
            }
            None => {
                self.entries.remove(key);
            }
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if let Some((key, previous)) = self.entries.remove(key) {
            // The file still holds the entry, so keep serving it.
            if let Err(e) = self.flush() {
                self.entries.insert(key, previous);
                return Err(e);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}
