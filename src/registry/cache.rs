//! Process-lifetime result cache shared by the registry clients.
//!
//! Replaces the original implementation's module-level cache dictionaries
//! (`_PYPI_CACHE`, `_DOCKER_MANIFEST_CACHE`, `_WHEEL_TESTER_CACHE`, ...) with
//! an owned object each client holds, following the orchestrator-scoped
//! lifecycle described for `RegistryClients`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::Mutex;

/// A memoizing cache keyed by `K`, storing `V`, with single-flight
/// semantics: concurrent lookups for the same key that isn't yet cached
/// share one in-flight fetch rather than issuing redundant requests.
pub struct ResultCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for ResultCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Construct an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, if present.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Insert `value` for `key`, overwriting any existing entry.
    pub async fn put(&self, key: K, value: V) {
        self.entries.lock().await.insert(key, value);
    }

    /// Look up `key`; on a miss, run `fetch` while holding the lock for the
    /// whole cache so concurrent lookups for the same key collapse onto one
    /// fetch, then cache and return the result.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = V>,
    {
        let mut guard = self.entries.lock().await;
        if let Some(value) = guard.get(&key) {
            return value.clone();
        }
        let value = fetch().await;
        guard.insert(key, value.clone());
        value
    }
}

/// A cache shareable across clones of a registry client.
pub type SharedCache<K, V> = Arc<ResultCache<K, V>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_fetch_caches_result() {
        let cache: ResultCache<String, u32> = ResultCache::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .get_or_fetch("numpy".to_string(), || async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    42
                })
                .await;
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_collide() {
        let cache: ResultCache<String, u32> = ResultCache::new();
        cache.put("a".to_string(), 1).await;
        cache.put("b".to_string(), 2).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"b".to_string()).await, Some(2));
    }
}
