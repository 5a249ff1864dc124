//! Memoized fetch layer.
//!
//! [`Cache::cached`] returns the stored value for a key or computes it,
//! following a TTL / stale-while-revalidate policy:
//!
//! ```text
//! age = now - created_time
//!
//!   forced │ missing      ──► await compute, store, return
//!   age <= ttl            ──► return cached
//!   age <= ttl + swr      ──► return cached, refresh in background
//!   otherwise             ──► await compute, store, return
//! ```
//!
//! Entries are replaced wholesale, never mutated in place. A background
//! refresh that fails is logged and leaves the old entry alone.

mod staleness;

pub use staleness::StalenessTracker;

use crate::log;
use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::Instant;

/// Freshness bookkeeping stored next to every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetadata {
    pub created_time: Instant,
    pub ttl: Duration,
    pub swr: Duration,
}

impl CacheMetadata {
    fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.created_time)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub metadata: CacheMetadata,
}

/// TTL and stale-while-revalidate windows for one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub swr: Duration,
}

impl CacheOptions {
    pub const fn new(ttl: Duration, swr: Duration) -> Self {
        Self { ttl, swr }
    }
}

/// A string-keyed store of computed values.
///
/// Cloning shares the underlying store, which lets background refresh tasks
/// write back into it.
#[derive(Debug)]
pub struct Cache<V> {
    name: &'static str,
    entries: Arc<RwLock<FxHashMap<String, CacheEntry<V>>>>,
    refreshing: Arc<Mutex<FxHashSet<String>>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            entries: Arc::clone(&self.entries),
            refreshing: Arc::clone(&self.refreshing),
        }
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache. `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::default(),
            refreshing: Arc::default(),
        }
    }

    /// Return the value for `key`, computing it if needed.
    ///
    /// `force_fresh` sees the current entry's metadata (if any) and may
    /// demand a recompute; `None` defers to the TTL windows. `compute` is
    /// called at most once; when it runs in the background its error is
    /// logged instead of returned.
    pub async fn cached<C, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        force_fresh: impl FnOnce(Option<&CacheMetadata>) -> Option<bool>,
        compute: C,
    ) -> Result<V>
    where
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let current = self.entries.read().get(key).cloned();
        let forced = force_fresh(current.as_ref().map(|entry| &entry.metadata)).unwrap_or(false);

        let Some(entry) = current.filter(|_| !forced) else {
            return self.compute_and_store(key, options, compute()).await;
        };

        let age = entry.metadata.age();
        if age <= entry.metadata.ttl {
            return Ok(entry.value);
        }

        if age <= entry.metadata.ttl + entry.metadata.swr {
            self.refresh_in_background(key, options, compute());
            return Ok(entry.value);
        }

        self.compute_and_store(key, options, compute()).await
    }

    /// Metadata of the current entry for `key`.
    #[cfg(test)]
    pub fn metadata(&self, key: &str) -> Option<CacheMetadata> {
        self.entries.read().get(key).map(|entry| entry.metadata)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    async fn compute_and_store<Fut>(&self, key: &str, options: CacheOptions, fut: Fut) -> Result<V>
    where
        Fut: Future<Output = Result<V>>,
    {
        let value = fut.await?;
        self.store(key, options, value.clone());
        Ok(value)
    }

    fn store(&self, key: &str, options: CacheOptions, value: V) {
        let metadata = CacheMetadata {
            created_time: Instant::now(),
            ttl: options.ttl,
            swr: options.swr,
        };
        self.entries
            .write()
            .insert(key.to_owned(), CacheEntry { value, metadata });
    }

    /// Spawn a detached refresh for `key` unless one is already running.
    fn refresh_in_background<Fut>(&self, key: &str, options: CacheOptions, fut: Fut)
    where
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if !self.refreshing.lock().insert(key.to_owned()) {
            return;
        }

        let cache = self.clone();
        let key = key.to_owned();
        tokio::spawn(async move {
            match fut.await {
                Ok(value) => cache.store(&key, options, value),
                Err(err) => log!("cache"; "{}: background refresh of `{key}` failed: {err:#}", cache.name),
            }
            cache.refreshing.lock().remove(&key);
        });
    }
}
