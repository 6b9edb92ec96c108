//! LRU cache with per-entry TTL (spec §4.5 "Cache").

use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Request-type TTL policy (spec §4.5: "TTL policy by request type").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Token metadata: effectively immutable.
    Immutable,
    Balance,
    ConfirmedTxStatus,
    PendingTxStatus,
}

impl TtlPolicy {
    pub fn duration(self) -> Duration {
        match self {
            TtlPolicy::Immutable => Duration::from_secs(24 * 3600),
            TtlPolicy::Balance => Duration::from_secs(15),
            TtlPolicy::ConfirmedTxStatus => Duration::from_secs(24 * 3600),
            TtlPolicy::PendingTxStatus => Duration::from_secs(5),
        }
    }
}

pub struct TtlCache<V: Clone> {
    inner: Mutex<LruCache<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(max_size.max(1)).unwrap(),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns `Some(value)` if `key` is present and not expired.
    /// Expired-on-access entries are evicted immediately.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.pop(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: String, value: V, ttl: Duration) {
        let mut inner = self.inner.lock();
        if inner.len() >= inner.cap().get() && inner.get(&key).is_none() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        inner.put(key, Entry { value, expires_at: Instant::now() + ttl });
    }

    /// Atomically returns the cached value or computes and stores it.
    /// Errors from `f` are not cached.
    pub async fn get_or_set<F, Fut, E>(&self, key: &str, ttl: Duration, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = f().await?;
        self.set(key.to_string(), value.clone(), ttl);
        Ok(value)
    }

    /// Sweeps every expired entry; intended to run on a per-minute
    /// interval (spec §4.5 "Cleanup goroutine").
    pub fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let expired: Vec<String> = inner
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.pop(key);
        }
        self.evictions.fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lru_plus_ttl_scenario_from_literal_test_case() {
        let cache: TtlCache<u32> = TtlCache::new(5);
        let long = Duration::from_secs(3600);
        cache.set("a".into(), 1, long);
        cache.set("b".into(), 2, long);
        cache.set("c".into(), 3, long);
        cache.set("d".into(), 4, long);
        cache.set("e".into(), 5, long);

        assert_eq!(cache.get("a"), Some(1));
        cache.set("f".into(), 6, long);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[tokio::test]
    async fn ttl_expiry_scenario_from_literal_test_case() {
        let cache: TtlCache<u32> = TtlCache::new(5);
        cache.set("x".into(), 1, Duration::from_millis(50));
        assert_eq!(cache.get("x"), Some(1));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("x"), None);
    }

    #[tokio::test]
    async fn get_or_set_does_not_cache_errors() {
        let cache: TtlCache<u32> = TtlCache::new(5);
        let result: Result<u32, &str> =
            cache.get_or_set("k", Duration::from_secs(1), || async { Err("boom") }).await;
        assert!(result.is_err());
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let cache: TtlCache<u32> = TtlCache::new(5);
        cache.set("short".into(), 1, Duration::from_millis(10));
        cache.set("long".into(), 2, Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(30)).await;
        let swept = cache.sweep_expired();
        assert_eq!(swept, 1);
        assert_eq!(cache.get("long"), Some(2));
    }
}
