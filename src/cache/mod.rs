//! Read-through TTL cache for provider responses.
//!
//! Entries are stored as JSON `{data, timestamp, duration}` in a pluggable
//! [`CacheBackend`]. An entry is fresh for `duration` milliseconds after
//! `timestamp`. Expired entries stay in the backend so failure-aware callers
//! can fall back to them or [`TtlCache::revive`] them with a longer lifetime.
//!
//! Backend failures never escape this module: a broken read is a miss, a
//! broken write is logged and dropped.

pub mod file;
pub mod memory;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::Result;
use crate::models::CacheConfig;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Raw key/value persistence behind the cache.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read the bytes stored under `key`, `None` if absent.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes under `key`, replacing any previous value.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Delete every key starting with one of `prefixes`. Returns the count.
    async fn remove_prefixed(&self, prefixes: &[String]) -> Result<usize>;
}

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        if let Ok(mut now) = self.now.lock() {
            *now += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Stored form of a cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Lifetime in milliseconds
    pub duration: u64,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = now.timestamp_millis() - self.timestamp;
        age <= self.duration as i64
    }
}

/// TTL cache over an injected backend and clock.
#[derive(Clone)]
pub struct TtlCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    long_ttl: Duration,
}

impl TtlCache {
    /// Standard lifetime.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
    /// Lifetime for entries revived after a rate-limit response.
    pub const LONG_TTL: Duration = Duration::from_secs(30 * 60);

    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            ttl: Self::DEFAULT_TTL,
            long_ttl: Self::LONG_TTL,
        }
    }

    /// In-memory cache with default lifetimes.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Build from configuration: file-backed when a directory is set.
    pub fn from_config(config: &CacheConfig) -> Self {
        let backend: Arc<dyn CacheBackend> = match &config.directory {
            Some(dir) => Arc::new(FileBackend::new(dir)),
            None => Arc::new(MemoryBackend::new()),
        };
        Self::new(backend).with_ttls(config.ttl(), config.long_ttl())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttls(mut self, ttl: Duration, long_ttl: Duration) -> Self {
        self.ttl = ttl;
        self.long_ttl = long_ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn long_ttl(&self) -> Duration {
        self.long_ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fresh value for `key`, `None` when missing, expired or unreadable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entry::<T>(key).await?;
        if entry.is_fresh(self.clock.now()) {
            Some(entry.data)
        } else {
            log::debug!("Cache expired: {}", key);
            None
        }
    }

    /// Value for `key` regardless of age.
    pub async fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entry::<T>(key).await.map(|entry| entry.data)
    }

    /// Store `value` under `key` for `duration`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, duration: Duration) {
        let entry = CacheEntry {
            data: value,
            timestamp: self.clock.now().timestamp_millis(),
            duration: duration.as_millis() as u64,
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Cache serialize failed for {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.backend.write(key, &bytes).await {
            log::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// Store `value` with the standard lifetime.
    pub async fn set_default<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.set(key, value, self.ttl).await
    }

    /// Re-stamp an existing entry with `now` and a new lifetime.
    ///
    /// Returns `false` when there is nothing to revive.
    pub async fn revive(&self, key: &str, duration: Duration) -> bool {
        match self.entry::<serde_json::Value>(key).await {
            Some(entry) => {
                self.set(key, &entry.data, duration).await;
                true
            }
            None => false,
        }
    }

    /// Delete all keys starting with any of `prefixes`.
    pub async fn clear(&self, prefixes: &[String]) -> usize {
        match self.backend.remove_prefixed(prefixes).await {
            Ok(removed) => {
                log::info!("Cache cleared: {} entries ({:?})", removed, prefixes);
                removed
            }
            Err(e) => {
                log::warn!("Cache clear failed for {:?}: {}", prefixes, e);
                0
            }
        }
    }

    async fn entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let bytes = match self.backend.read(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Corrupt cache entry {}: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn cache_with_clock() -> (TtlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = TtlCache::in_memory().with_clock(clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _) = cache_with_clock();
        cache.set_default("k", &vec![1, 2, 3]).await;
        assert_eq!(cache.get::<Vec<i32>>("k").await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_get_after_expiry_is_none() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", &"v", Duration::from_secs(60)).await;

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get::<String>("k").await, None);
        // Expired entries are kept for fallback
        assert_eq!(cache.get_stale::<String>("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let (cache, _) = cache_with_clock();
        cache.set_default("k", &1).await;
        cache.set_default("k", &2).await;
        assert_eq!(cache.get::<i32>("k").await, Some(2));
    }

    #[tokio::test]
    async fn test_revive_extends_lifetime() {
        let (cache, clock) = cache_with_clock();
        cache.set_default("k", &"old").await;
        clock.advance(TtlCache::DEFAULT_TTL + Duration::from_secs(1));
        assert_eq!(cache.get::<String>("k").await, None);

        assert!(cache.revive("k", TtlCache::LONG_TTL).await);
        clock.advance(Duration::from_secs(20 * 60));
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("old"));

        clock.advance(Duration::from_secs(11 * 60));
        assert_eq!(cache.get::<String>("k").await, None);
    }

    #[tokio::test]
    async fn test_revive_missing_key() {
        let (cache, _) = cache_with_clock();
        assert!(!cache.revive("nope", TtlCache::LONG_TTL).await);
    }

    #[tokio::test]
    async fn test_clear_by_prefix() {
        let (cache, _) = cache_with_clock();
        cache.set_default("airly-measurements-1", &1).await;
        cache.set_default("airly-installations-x", &2).await;
        cache.set_default("gios-measurements-1", &3).await;

        let removed = cache.clear(&["airly-".to_string()]).await;
        assert_eq!(removed, 2);
        assert_eq!(cache.get::<i32>("airly-measurements-1").await, None);
        assert_eq!(cache.get::<i32>("gios-measurements-1").await, Some(3));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let backend = Arc::new(MemoryBackend::new());
        backend.write("k", b"{not json").await.unwrap();
        let cache = TtlCache::new(backend);
        assert_eq!(cache.get::<i32>("k").await, None);
        assert_eq!(cache.get_stale::<i32>("k").await, None);
    }

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(AppError::Io(std::io::Error::other("disk on fire")))
        }
        async fn write(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
            Err(AppError::Io(std::io::Error::other("quota exceeded")))
        }
        async fn remove_prefixed(&self, _prefixes: &[String]) -> Result<usize> {
            Err(AppError::Io(std::io::Error::other("nope")))
        }
    }

    #[tokio::test]
    async fn test_backend_errors_never_propagate() {
        let cache = TtlCache::new(Arc::new(BrokenBackend));
        cache.set_default("k", &1).await;
        assert_eq!(cache.get::<i32>("k").await, None);
        assert!(!cache.revive("k", TtlCache::LONG_TTL).await);
        assert_eq!(cache.clear(&["k".to_string()]).await, 0);
    }
}
