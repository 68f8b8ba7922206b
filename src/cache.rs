//! Time-bounded result cache shared by request handlers and the poller.
//!
//! Entries are never evicted: a stale entry is treated as absent and is
//! overwritten by the next successful fetch. Failed fetches leave the map
//! untouched. Two concurrent misses on one key may both reach the upstream.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::model::Symbol;

pub struct CacheKey;

impl CacheKey {
    pub fn quote(symbol: &Symbol) -> String {
        format!("quote_{symbol}")
    }

    pub fn history(symbol: &Symbol) -> String {
        format!("history_{symbol}")
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub fetched_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct ResultCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached payload for `key` if it is younger than `ttl`,
    /// otherwise run `fetch` and store its successful result.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(payload) = self.get_fresh(key, ttl).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(payload);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // The lock is not held across the upstream call.
        let payload = fetch().await?;
        self.store(key, payload.clone()).await;
        Ok(payload)
    }

    pub async fn get_fresh(&self, key: &str, ttl: Duration) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.fetched_at) < ttl)
            .map(|entry| entry.payload.clone())
    }

    pub async fn store(&self, key: &str, payload: V) {
        let entry = CacheEntry {
            payload,
            fetched_at: self.clock.now(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    /// Raw entry regardless of freshness.
    pub async fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_millis(60_000);

    fn cache() -> (Arc<ManualClock>, ResultCache<String>) {
        let clock = Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2025, 8, 30).unwrap(),
        ));
        let cache = ResultCache::new(clock.clone() as Arc<dyn Clock>);
        (clock, cache)
    }

    async fn fetch_counted(
        cache: &ResultCache<String>,
        calls: &AtomicUsize,
        value: &str,
    ) -> Result<String, String> {
        cache
            .get_or_fetch("quote_AAPL", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value.to_string())
            })
            .await
    }

    #[tokio::test]
    async fn hit_within_ttl_skips_fetch() {
        let (clock, cache) = cache();
        let calls = AtomicUsize::new(0);

        assert_eq!(fetch_counted(&cache, &calls, "first").await.unwrap(), "first");
        clock.advance(Duration::from_millis(59_999));
        assert_eq!(fetch_counted(&cache, &calls, "second").await.unwrap(), "first");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn expiry_refetches_once_and_overwrites() {
        let (clock, cache) = cache();
        let calls = AtomicUsize::new(0);

        fetch_counted(&cache, &calls, "first").await.unwrap();
        clock.advance(TTL);
        assert_eq!(fetch_counted(&cache, &calls, "second").await.unwrap(), "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let entry = cache.entry("quote_AAPL").await.expect("entry");
        assert_eq!(entry.payload, "second");
        assert_eq!(entry.fetched_at, clock.now());
    }

    #[tokio::test]
    async fn failure_keeps_stale_entry_untouched() {
        let (clock, cache) = cache();
        cache.store("quote_AAPL", "old".to_string()).await;
        let stored_at = cache.entry("quote_AAPL").await.unwrap().fetched_at;
        clock.advance(TTL * 2);

        let result: Result<String, String> = cache
            .get_or_fetch("quote_AAPL", TTL, || async { Err("boom".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "boom");

        let entry = cache.entry("quote_AAPL").await.expect("stale entry kept");
        assert_eq!(entry.payload, "old");
        assert_eq!(entry.fetched_at, stored_at);
    }

    #[tokio::test]
    async fn failure_on_empty_cache_writes_nothing() {
        let (_clock, cache) = cache();
        let result: Result<String, &str> = cache
            .get_or_fetch("history_AAPL", TTL, || async { Err("not found") })
            .await;
        assert!(result.is_err());
        assert!(cache.entry("history_AAPL").await.is_none());
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[test]
    fn keys_are_prefixed_by_kind() {
        let symbol = Symbol::parse("aapl").unwrap();
        assert_eq!(CacheKey::quote(&symbol), "quote_AAPL");
        assert_eq!(CacheKey::history(&symbol), "history_AAPL");
    }
}
