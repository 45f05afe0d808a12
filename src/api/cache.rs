use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use moka::future::Cache;
use moka::Expiry;

#[derive(Clone)]
struct Timed<V> {
    value: V,
    ttl: Duration,
}

/// Expires each entry after the TTL it was loaded with.
struct PerEntryTtl;

impl<K, V> Expiry<K, Timed<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &K, entry: &Timed<V>, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Read-through cache of query results.
///
/// Concurrent misses on one key share a single loader call. Failed loads are
/// returned to every waiter and never stored.
#[derive(Clone)]
pub struct ResultCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Cache<K, Timed<V>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { entries }
    }

    pub async fn get<F, Fut>(&self, key: K, ttl: Duration, loader: F) -> anyhow::Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        let entry = self
            .entries
            .try_get_with(key, async move {
                loader().await.map(|value| Timed { value, ttl })
            })
            .await
            .map_err(|e| anyhow!("{:#}", e))?;

        Ok(entry.value)
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.invalidate(key).await;
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::future::join_all;

    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let cache: ResultCache<&'static str, u64> = ResultCache::new(100);
        let loads = Arc::new(AtomicUsize::new(0));

        let results = join_all((0..50).map(|_| {
            let cache = cache.clone();
            let loads = loads.clone();
            async move {
                cache
                    .get("prices", TTL, || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42)
                    })
                    .await
            }
        }))
        .await;

        assert!(results.iter().all(|r| matches!(r, Ok(42))));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache: ResultCache<u32, String> = ResultCache::new(10);

        let failed = cache
            .get(1, TTL, || async { Err(anyhow!("database unavailable")) })
            .await;
        assert!(failed.unwrap_err().to_string().contains("database unavailable"));

        let value = cache
            .get(1, TTL, || async { Ok("loaded".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "loaded");
    }

    #[tokio::test]
    async fn test_entries_expire_after_their_ttl() {
        let cache: ResultCache<u32, u32> = ResultCache::new(10);

        cache.get(1, Duration::from_millis(50), || async { Ok(1) }).await.unwrap();
        cache.get(2, TTL, || async { Ok(2) }).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        let reloaded = cache.get(1, TTL, || async { Ok(10) }).await.unwrap();
        let cached = cache.get(2, TTL, || async { Ok(20) }).await.unwrap();
        assert_eq!(reloaded, 10);
        assert_eq!(cached, 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache: ResultCache<u32, u32> = ResultCache::new(10);
        cache.get(1, TTL, || async { Ok(1) }).await.unwrap();
        cache.get(2, TTL, || async { Ok(2) }).await.unwrap();

        cache.invalidate(&1).await;
        assert_eq!(cache.get(1, TTL, || async { Ok(11) }).await.unwrap(), 11);
        assert_eq!(cache.get(2, TTL, || async { Ok(22) }).await.unwrap(), 2);

        cache.invalidate_all();
        assert_eq!(cache.get(2, TTL, || async { Ok(22) }).await.unwrap(), 22);
    }
}
