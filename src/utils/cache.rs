//! In-Memory Key/Value Cache Module
//!
//! Backing store for the quote cache and the rate limiter.
//! `KvStore` is the injected abstraction; `MemoryStore` implements it on
//! DashMap for concurrent access without lock contention.
//!
//! Features:
//! - Per-entry TTL expiration
//! - Cache HIT/MISS logging and counters
//! - Periodic purge task

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::models::types::{Quote, QuoteKey};

/// Minimal async key/value contract. A networked store (e.g. Redis) can
/// implement it without touching callers.
#[async_trait]
pub trait KvStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Live value for `key`, `None` when missing or expired
    async fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace; `None` TTL never expires
    async fn set(&self, key: &str, value: V, ttl: Option<Duration>);

    /// Remove `key` immediately
    async fn expire(&self, key: &str);

    /// Drop every expired entry, returning how many were removed
    async fn purge_expired(&self) -> usize;

    /// Number of stored entries (including not-yet-purged expired ones)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache entry with timestamp for TTL validation
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.created_at.elapsed() >= ttl,
            None => false,
        }
    }

    /// Remaining seconds before expiry (`u64::MAX` when unbounded)
    pub fn remaining_ttl(&self) -> u64 {
        match self.ttl {
            Some(ttl) => ttl.saturating_sub(self.created_at.elapsed()).as_secs(),
            None => u64::MAX,
        }
    }
}

/// DashMap-backed `KvStore`
#[derive(Clone)]
pub struct MemoryStore<V> {
    store: Arc<DashMap<String, CacheEntry<V>>>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl<V> KvStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let entry = self.store.get(key)?;
        if entry.is_expired() {
            drop(entry); // release read lock before removing
            self.store.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        self.store.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    async fn expire(&self, key: &str) {
        self.store.remove(key);
    }

    async fn purge_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.store.len())
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}

// ============================================
// Quote cache
// ============================================

/// Typed quote cache keyed by `(token_in, token_out, amount, slippage)`
#[derive(Clone)]
pub struct QuoteCache {
    store: Arc<dyn KvStore<Quote>>,
    ttl: Duration,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl QuoteCache {
    pub fn new(store: Arc<dyn KvStore<Quote>>, ttl_secs: u64) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(ttl_secs),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// In-memory cache with the given TTL
    pub fn in_memory(ttl_secs: u64) -> Self {
        Self::new(Arc::new(MemoryStore::<Quote>::new()), ttl_secs)
    }

    pub async fn get(&self, key: &QuoteKey) -> Option<Quote> {
        let cache_key = key.cache_key();
        match self.store.get(&cache_key).await {
            Some(quote) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                info!("✅ CACHE HIT: {}", cache_key);
                Some(quote)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 CACHE MISS: {}", cache_key);
                None
            }
        }
    }

    pub async fn set(&self, quote: &Quote) {
        let cache_key = quote.key.cache_key();
        self.store.set(&cache_key, quote.clone(), Some(self.ttl)).await;
        debug!("💾 CACHE SET: {} (TTL: {}s)", cache_key, self.ttl.as_secs());
    }

    pub async fn invalidate(&self, key: &QuoteKey) {
        self.store.expire(&key.cache_key()).await;
    }

    pub async fn cleanup_expired(&self) -> usize {
        let removed = self.store.purge_expired().await;
        if removed > 0 {
            info!("🧹 CACHE CLEANUP: {} expired quotes removed", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    /// Purge expired quotes on a fixed interval for the lifetime of the process
    pub fn spawn_cleanup_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cache.cleanup_expired().await;
            }
        })
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}
