// Key/value cache store shared by the FX cache and the search result gate
// The store is the single source of truth for cached state; callers never
// keep their own copy across requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::error::TripError;

#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    // Value for `key`, or None when absent or expired
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TripError>;

    // Unconditional overwrite; last writer wins
    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), TripError>;
}

pub async fn get_json<T, S>(store: &S, key: &str) -> Result<Option<T>, TripError>
where
    T: DeserializeOwned,
    S: CacheStore + ?Sized,
{
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

pub async fn put_json<T, S>(store: &S, key: &str, value: &T, ttl: Duration) -> Result<(), TripError>
where
    T: Serialize,
    S: CacheStore + ?Sized,
{
    let raw = serde_json::to_vec(value)?;
    store.put(key, Bytes::from(raw), ttl).await
}

#[async_trait]
impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TripError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), TripError> {
        (**self).put(key, value, ttl).await
    }
}

#[derive(Debug, Default)]
pub struct StoreStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub put_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub expired_count: usize,
    pub put_count: usize,
}

struct StoreEntry {
    data: Bytes,
    expires_at: DateTime<Utc>,
}

impl StoreEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// Process-local store for tests, benchmarks and the CLI.
pub struct InMemoryStore<C: Clock = SystemClock> {
    entries: DashMap<String, StoreEntry>,
    clock: C,
    stats: StoreStats,
}

impl InMemoryStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            stats: StoreStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> StoreStatsReport {
        StoreStatsReport {
            items_count: self.entries.len(),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
            put_count: self.stats.put_count.load(Ordering::SeqCst),
        }
    }

    // Drop every key starting with `prefix`, returning how many went
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        debug!(prefix, removed, "invalidated cache entries");
        removed
    }

    fn lookup(&self, key: &str) -> Option<Bytes> {
        let now = self.clock.now();

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                trace!(key, "store hit");
                return Some(entry.data.clone());
            }
            Some(_) => true,
            None => false,
        };

        // Guard from get() is dropped above; safe to mutate the shard now
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
        }
        self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
        trace!(key, expired, "store miss");
        None
    }
}

#[async_trait]
impl<C: Clock> CacheStore for InMemoryStore<C> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TripError> {
        Ok(self.lookup(key))
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), TripError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| TripError::StoreError(format!("ttl out of range: {}", e)))?;
        let entry = StoreEntry {
            data: value,
            expires_at: self.clock.now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        self.stats.put_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use serde::Deserialize;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 2, 14, 8, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_expiration_and_ttl() {
        let clock = clock();
        let store = InMemoryStore::with_clock(clock.clone());

        store
            .put("long", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put("short", Bytes::from_static(b"2"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(store.get("long").await.unwrap().is_some());
        assert!(store.get("short").await.unwrap().is_some());

        clock.advance(chrono::Duration::seconds(5));
        assert!(store.get("long").await.unwrap().is_some());
        assert!(store.get("short").await.unwrap().is_none());

        clock.advance(chrono::Duration::seconds(55));
        assert!(store.get("long").await.unwrap().is_none());

        let stats = store.stats();
        assert_eq!(stats.expired_count, 2);
        assert_eq!(stats.items_count, 0);
        assert_eq!(stats.hit_count, 3);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(30);
        store.put("k", Bytes::from_static(b"old"), ttl).await.unwrap();
        store.put("k", Bytes::from_static(b"new"), ttl).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().unwrap(), Bytes::from_static(b"new"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().put_count, 2);
    }

    #[tokio::test]
    async fn test_json_helpers_round_trip_typed_values() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Rate {
            rate: f64,
        }

        let store = InMemoryStore::new();
        put_json(&store, "fx:SGD:USD", &Rate { rate: 1.35 }, Duration::from_secs(60))
            .await
            .unwrap();

        let cached: Option<Rate> = get_json(&store, "fx:SGD:USD").await.unwrap();
        assert_eq!(cached, Some(Rate { rate: 1.35 }));

        let missing: Option<Rate> = get_json(&store, "fx:SGD:EUR").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_json_is_an_error() {
        let store = InMemoryStore::new();
        store
            .put("bad", Bytes::from_static(b"{oops"), Duration::from_secs(60))
            .await
            .unwrap();

        let result: Result<Option<serde_json::Value>, _> = get_json(&store, "bad").await;
        assert!(matches!(result, Err(TripError::JsonParseError(_))));
    }

    #[tokio::test]
    async fn test_prefix_invalidation() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        for key in ["fx:SGD:USD", "fx:SGD:EUR", "search:abc"] {
            store.put(key, Bytes::from_static(b"x"), ttl).await.unwrap();
        }

        assert_eq!(store.invalidate_prefix("fx:"), 2);
        assert!(store.get("fx:SGD:USD").await.unwrap().is_none());
        assert!(store.get("search:abc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_access_with_contention() {
        let store = Arc::new(InMemoryStore::new());
        let ttl = Duration::from_secs(300);

        let mut handles = vec![];
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for j in 0..200 {
                    let key = format!("search:{}", j % 10);
                    if j % 5 == 0 {
                        let value = Bytes::from(vec![i as u8, j as u8]);
                        store.put(&key, value, ttl).await.unwrap();
                    } else {
                        let _ = store.get(&key).await.unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = store.stats();
        assert_eq!(stats.items_count, 2);
        assert_eq!(stats.put_count, 8 * 40);
        assert_eq!(stats.hit_count + stats.miss_count, 8 * 160);
    }
}
