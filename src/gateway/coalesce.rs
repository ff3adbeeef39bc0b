//! Single-flight deduplication of concurrent upstream calls.
//!
//! The first caller for a key spawns the work and registers a shared handle to
//! it; callers arriving while it runs await that same handle instead of starting
//! their own. The entry is removed the moment the work settles, so a later
//! request with the same key starts a fresh call (longer-term reuse is the
//! cache's job, not this map's).
//!
//! The work runs as its own task. Dropping any awaiting caller, including the
//! one that started it, never cancels a call other callers still depend on.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoalesceError {
    #[error("coalesced upstream task panicked")]
    Panicked,
    #[error("coalesced upstream task was cancelled")]
    Cancelled,
}

type Pending<V> = Shared<BoxFuture<'static, Result<V, CoalesceError>>>;

/// Map from key to `(generation, shared handle)`.
type PendingMap<V> = DashMap<String, (u64, Pending<V>)>;

/// Deterministic key for a batch: the target language plus the exact ordered
/// list of texts that missed the cache.
pub fn batch_key(target_language: &str, texts: &[String]) -> String {
    serde_json::json!([target_language, texts]).to_string()
}

pub struct Coalescer<V> {
    pending: Arc<PendingMap<V>>,
    generation: AtomicU64,
}

impl<V> Default for Coalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Coalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Await the pending call for `key`, or start one with `start` if none is running.
    pub async fn get_or_start<F, Fut>(&self, key: String, start: F) -> Result<V, CoalesceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let pending = match self.pending.entry(key) {
            Entry::Occupied(entry) => {
                debug!(key_len = entry.key().len(), "Joining in-flight upstream call");
                entry.get().1.clone()
            }
            Entry::Vacant(entry) => {
                let id = self.generation.fetch_add(1, Ordering::Relaxed);
                let settle = Settle {
                    pending: Arc::clone(&self.pending),
                    key: entry.key().clone(),
                    id,
                };
                let work = start();
                let handle = tokio::spawn(async move {
                    // Dropped when the work finishes or unwinds, before awaiters wake.
                    let _settle = settle;
                    work.await
                });
                let shared = async move {
                    handle.await.map_err(|e| {
                        if e.is_panic() {
                            CoalesceError::Panicked
                        } else {
                            CoalesceError::Cancelled
                        }
                    })
                }
                .boxed()
                .shared();
                entry.insert((id, shared.clone()));
                shared
            }
        };

        pending.await
    }

    /// Number of distinct calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

/// Removes its own registration (and only its own) from the pending map on drop.
struct Settle<V> {
    pending: Arc<PendingMap<V>>,
    key: String,
    id: u64,
}

impl<V> Drop for Settle<V> {
    fn drop(&mut self) {
        self.pending
            .remove_if(&self.key, |_, (generation, _)| *generation == self.id);
    }
}
