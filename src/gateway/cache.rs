//! Durable translation cache: an in-memory map mirrored to a single JSON file.
//!
//! The backing file is a flat object of `"{lang}::{text}" -> {value, createdAt}`
//! (`createdAt` in epoch milliseconds). It is read once at startup and rewritten
//! wholesale on every flush. Expired or valueless entries are dropped at load
//! time; nothing sweeps the map afterwards.
//!
//! Persistence failures never reach callers. A missing or corrupt file starts an
//! empty cache, and a failed flush leaves the in-memory map authoritative until
//! the next successful one.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Joins the language code and the source text into one key. Language codes
/// are validated to never contain `:`, so the first separator always splits
/// the key back into its parts.
pub const KEY_SEPARATOR: &str = "::";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// On-disk shape of a single entry.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    value: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
}

/// Outcome of reading the backing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub dropped: usize,
}

pub struct TranslationCache {
    entries: DashMap<String, CacheEntry>,
    path: PathBuf,
    ttl: TimeDelta,
    /// Serializes flushes so an older snapshot never lands after a newer one.
    flush_lock: Mutex<()>,
}

impl TranslationCache {
    /// Create an empty cache backed by `path` without touching the disk.
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            path: path.into(),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            flush_lock: Mutex::new(()),
        }
    }

    /// Create a cache and populate it from the backing file.
    pub async fn load(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let cache = Self::new(path, ttl);
        match tokio::fs::read_to_string(&cache.path).await {
            Ok(contents) => match cache.load_from_str(&contents, Utc::now()) {
                Ok(summary) => info!(
                    path = %cache.path.display(),
                    loaded = summary.loaded,
                    dropped = summary.dropped,
                    "Translation cache loaded"
                ),
                Err(e) => warn!(
                    path = %cache.path.display(),
                    error = %e,
                    "Translation cache file is corrupt, starting empty"
                ),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %cache.path.display(), "No translation cache file, starting empty");
            }
            Err(e) => warn!(
                path = %cache.path.display(),
                error = %e,
                "Failed to read translation cache, starting empty"
            ),
        }
        cache
    }

    /// Merge entries from a serialized store, keeping only those that are
    /// still fresh at `now` and carry a non-empty string value.
    fn load_from_str(&self, contents: &str, now: DateTime<Utc>) -> Result<LoadSummary, CacheError> {
        let raw: BTreeMap<String, Value> = serde_json::from_str(contents)?;
        let mut summary = LoadSummary::default();

        for (key, value) in raw {
            let entry = serde_json::from_value::<StoredEntry>(value)
                .ok()
                .filter(|stored| !stored.value.is_empty())
                .map(|stored| CacheEntry {
                    value: stored.value,
                    created_at: stored.created_at,
                })
                .filter(|entry| self.is_fresh(entry, now));

            match entry {
                Some(entry) => {
                    self.entries.insert(key, entry);
                    summary.loaded += 1;
                }
                None => summary.dropped += 1,
            }
        }

        Ok(summary)
    }

    pub fn key(target_language: &str, text: &str) -> String {
        format!("{target_language}{KEY_SEPARATOR}{text}")
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.created_at) <= self.ttl
    }

    /// Look up a translation. Entries past their TTL are ignored but left in place.
    pub fn get(&self, target_language: &str, text: &str) -> Option<String> {
        let entry = self.entries.get(&Self::key(target_language, text))?;
        self.is_fresh(&entry, Utc::now())
            .then(|| entry.value.clone())
    }

    /// Insert or overwrite a translation. Empty values are never stored.
    pub fn put(&self, target_language: &str, text: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        self.entries.insert(
            Self::key(target_language, text),
            CacheEntry {
                value: value.to_string(),
                created_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole map to the backing file, returning the entry count.
    ///
    /// The snapshot goes to a sibling temp file first and is then renamed over
    /// the store, so readers never observe a half-written file.
    pub async fn flush(&self) -> Result<usize, CacheError> {
        let _guard = self.flush_lock.lock().await;

        let snapshot: BTreeMap<String, StoredEntry> = self
            .entries
            .iter()
            .map(|item| {
                (
                    item.key().clone(),
                    StoredEntry {
                        value: item.value().value.clone(),
                        created_at: item.value().created_at,
                    },
                )
            })
            .collect();
        let count = snapshot.len();
        let bytes = serde_json::to_vec(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), entries = count, "Translation cache flushed");
        Ok(count)
    }

    /// Flush without waiting; failures are logged and otherwise ignored.
    pub fn flush_in_background(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = cache.flush().await {
                warn!(path = %cache.path.display(), error = %e, "Failed to flush translation cache");
            }
        });
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "translation-cache".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
