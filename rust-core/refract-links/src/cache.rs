// SPDX-License-Identifier: PMPL-1.0-or-later
//! Shared caches for rewrite sessions.
//!
//! Rewrite sessions are independent, but two lookups are expensive enough
//! to share process-wide: shard routing tables and count estimates. Both
//! are served from an injected [`RewriteCaches`] service rather than a
//! static singleton. Entries are computed at most once per key and never
//! invalidated — staleness is an accepted, documented window.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Concurrent map with at-most-once-computed-per-key semantics.
///
/// Readers share a lock-free-on-hit path (read lock only); the first miss
/// for a key computes the value under the write lock, so a key's closure
/// runs exactly once even with concurrent sessions racing on it.
#[derive(Debug, Default)]
pub struct OnceCache<K, V> {
    inner: RwLock<HashMap<K, Arc<V>>>,
}

impl<K: Eq + Hash + Clone, V> OnceCache<K, V> {
    pub fn new() -> Self {
        OnceCache {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.read().get(key).cloned()
    }

    /// Fetch the cached value for `key`, computing it on first use.
    pub fn get_or_compute(&self, key: K, compute: impl FnOnce() -> V) -> Arc<V> {
        if let Some(hit) = self.read().get(&key) {
            return Arc::clone(hit);
        }
        let mut map = self.write();
        // a racing session may have inserted while we waited on the lock
        if let Some(hit) = map.get(&key) {
            return Arc::clone(hit);
        }
        debug!("cache miss, computing entry");
        let value = Arc::new(compute());
        map.insert(key, Arc::clone(&value));
        value
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A poisoned lock only ever guards fully-inserted entries, so recovery
    // is safe here.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<K, Arc<V>>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<K, Arc<V>>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cache key for shard routing tables: (index name, shard count).
pub type RoutingKey = (String, u32);

/// The injected cache service shared across rewrite sessions.
#[derive(Debug, Default)]
pub struct RewriteCaches {
    /// Count estimates keyed by rendered query.
    pub count_estimates: OnceCache<String, u64>,
    /// Shard routing tables keyed by (index, shard count).
    pub routing: OnceCache<RoutingKey, Vec<u32>>,
}

impl RewriteCaches {
    pub fn new() -> Self {
        RewriteCaches::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_computes_once_per_key() {
        let cache: OnceCache<String, u64> = OnceCache::new();
        let calls = AtomicUsize::new(0);

        let a = cache.get_or_compute("k".into(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            42
        });
        let b = cache.get_or_compute("k".into(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            99
        });

        assert_eq!(*a, 42);
        assert_eq!(*b, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_keys_compute_separately() {
        let cache: OnceCache<u32, u32> = OnceCache::new();
        assert_eq!(*cache.get_or_compute(1, || 10), 10);
        assert_eq!(*cache.get_or_compute(2, || 20), 20);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_sessions_share_entries() {
        let caches = Arc::new(RewriteCaches::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let caches = Arc::clone(&caches);
            handles.push(std::thread::spawn(move || {
                caches
                    .routing
                    .get_or_compute(("idx".into(), 4), || vec![0, 1, 2, 3])
                    .as_ref()
                    .clone()
            }));
        }
        for handle in handles {
            assert_eq!(handle.join().expect("thread"), vec![0, 1, 2, 3]);
        }
        assert_eq!(caches.routing.len(), 1);
    }
}
