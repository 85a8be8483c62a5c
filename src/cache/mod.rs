//! Shared read cache sitting in front of the repository engine: a single
//! process-wide, weighted LRU keyed by the exact query a caller asked for,
//! with single-flight computation so a thundering herd of identical reads
//! during a watch wakeup only runs the underlying query once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru_mem::LruCache;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use crate::config::CacheSpecConfig;
use crate::errors::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub project: String,
    pub repository: String,
    pub revision: i64,
    /// Stable fingerprint of the query shape (path pattern / jsonpath
    /// expressions) so `find` and `get` results never collide.
    pub fingerprint: String,
}

#[derive(Clone)]
struct CachedEntry {
    value: Value,
    cached_at: Instant,
}

/// Weighted LRU over `Value` results, expiring entries a caller hasn't
/// touched in `expire_after_access`, with in-flight computations folded
/// so concurrent callers for the same key share one computation.
pub struct QueryCache {
    expire_after_access: Duration,
    store: Mutex<LruCache<CacheKey, CachedEntry>>,
    in_flight: DashMap<CacheKey, Arc<OnceCell<Result<Value, CoreError>>>>,
}

impl QueryCache {
    pub fn new(config: &CacheSpecConfig) -> QueryCache {
        QueryCache {
            expire_after_access: Duration::from_millis(config.expire_after_access_millis),
            store: Mutex::new(LruCache::new(config.capacity_bytes as usize)),
            in_flight: DashMap::new(),
        }
    }

    /// Returns the cached value for `key`, or computes it with `compute`
    /// if absent, expired, or evicted. Concurrent callers for the same key
    /// share a single in-flight `compute` call.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<Value, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Value, CoreError>>,
    {
        if let Some(value) = self.get_fresh(&key).await {
            return Ok(value);
        }

        let cell = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| async {
                let result = compute().await;
                if let Ok(value) = &result {
                    self.insert(key.clone(), value.clone()).await;
                }
                result
            })
            .await
            .clone();

        self.in_flight.remove(&key);
        result
    }

    async fn get_fresh(&self, key: &CacheKey) -> Option<Value> {
        let mut store = self.store.lock().await;
        let entry = store.get(key)?.clone();
        if entry.cached_at.elapsed() > self.expire_after_access {
            store.remove(key);
            return None;
        }
        // Refresh the access timestamp by reinserting; this also promotes
        // the entry to most-recently-used in the underlying LRU.
        store.insert(
            key.clone(),
            CachedEntry {
                value: entry.value.clone(),
                cached_at: Instant::now(),
            },
        );
        Some(entry.value)
    }

    async fn insert(&self, key: CacheKey, value: Value) {
        let mut store = self.store.lock().await;
        let _ = store.insert(
            key,
            CachedEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate_repository(&self, project: &str, repository: &str) {
        let mut store = self.store.lock().await;
        let stale: Vec<CacheKey> = store
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| k.project == project && k.repository == repository)
            .collect();
        for key in stale {
            store.remove(&key);
        }
    }
}

impl lru_mem::MemSize for CachedEntry {
    fn mem_size(&self) -> usize {
        // Approximate: the cache bounds memory, it does not need byte-exact
        // accounting of every JSON node.
        std::mem::size_of::<CachedEntry>() + self.value.to_string().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> CacheSpecConfig {
        CacheSpecConfig {
            capacity_bytes: 1024 * 1024,
            expire_after_access_millis: 60_000,
        }
    }

    fn key() -> CacheKey {
        CacheKey {
            project: "p".to_string(),
            repository: "r".to_string(),
            revision: 1,
            fingerprint: "/a.json".to_string(),
        }
    }

    #[tokio::test]
    async fn second_get_reuses_cached_value_without_recomputing() {
        let cache = QueryCache::new(&config());
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_compute(key(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"k": 1}))
            })
            .await
            .unwrap();
        let second = cache
            .get_or_compute(key(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"k": 1}))
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_repository_forces_recompute() {
        let cache = QueryCache::new(&config());
        cache.get_or_compute(key(), || async { Ok(json!(1)) }).await.unwrap();
        cache.invalidate_repository("p", "r").await;

        let calls = AtomicUsize::new(0);
        cache
            .get_or_compute(key(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(2))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
