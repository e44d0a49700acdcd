//! Fixed-window rate limiter backed by the injected `KvStore`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::config::RateLimitConfig;
use crate::utils::cache::{KvStore, MemoryStore};

/// Per-identity window counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub count: u32,
    /// Unix milliseconds at which the window resets
    pub window_reset_at_ms: u64,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: u64,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, rounded up
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_at_ms.saturating_sub(now_ms).div_ceil(1000)
    }
}

pub struct RateLimiter {
    store: Arc<dyn KvStore<RateLimitRecord>>,
    config: RateLimitConfig,
    /// Serialises the read-modify-write on the store
    guard: Mutex<()>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore<RateLimitRecord>>, config: RateLimitConfig) -> Self {
        Self {
            store,
            config,
            guard: Mutex::new(()),
        }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(Arc::new(MemoryStore::<RateLimitRecord>::new()), config)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and count one request for `identity` at the current time
    pub async fn check_rate_limit(&self, identity: &str) -> RateLimitDecision {
        self.check_at(identity, now_ms()).await
    }

    /// Check and count one request for `identity` at `now_ms`.
    ///
    /// A window starts on the first request and lasts `window_ms`; requests at or
    /// after `window_reset_at_ms` open a fresh window.
    pub async fn check_at(&self, identity: &str, now_ms: u64) -> RateLimitDecision {
        let probability = self.config.eviction_probability.clamp(0.0, 1.0);
        let sweep = probability > 0.0 && rand::thread_rng().gen_bool(probability);
        if sweep {
            let removed = self.store.purge_expired().await;
            if removed > 0 {
                debug!("🧹 Rate limit sweep removed {} records", removed);
            }
        }

        let key = format!("ratelimit:{}", identity);
        let _lock = self.guard.lock().await;

        let mut record = match self.store.get(&key).await {
            Some(record) if now_ms < record.window_reset_at_ms => record,
            _ => RateLimitRecord {
                count: 0,
                window_reset_at_ms: now_ms + self.config.window_ms,
            },
        };

        if record.count >= self.config.max_requests {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms: record.window_reset_at_ms,
            };
        }

        record.count += 1;
        let ttl = Duration::from_millis(record.window_reset_at_ms.saturating_sub(now_ms));
        let decision = RateLimitDecision {
            allowed: true,
            remaining: self.config.max_requests - record.count,
            reset_at_ms: record.window_reset_at_ms,
        };
        self.store.set(&key, record, Some(ttl)).await;
        decision
    }
}

pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::in_memory(RateLimitConfig {
            max_requests: 20,
            window_ms: 60_000,
            eviction_probability: 0.0,
        })
    }

    #[tokio::test]
    async fn test_twenty_first_call_refused() {
        let limiter = limiter();
        let start = 1_000_000;

        for i in 0..20 {
            let decision = limiter.check_at("alice", start + i).await;
            assert!(decision.allowed, "call {} should pass", i + 1);
            assert_eq!(decision.remaining, 19 - i as u32);
        }

        let refused = limiter.check_at("alice", start + 20).await;
        assert!(!refused.allowed);
        assert_eq!(refused.remaining, 0);
        assert_eq!(refused.reset_at_ms, start + 60_000);
        assert_eq!(refused.retry_after_secs(start + 20), 60);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter();
        let start = 5_000;
        for i in 0..21 {
            limiter.check_at("bob", start + i).await;
        }

        let decision = limiter.check_at("bob", start + 60_000).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 19);
        assert_eq!(decision.reset_at_ms, start + 120_000);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let limiter = limiter();
        for i in 0..20 {
            limiter.check_at("carol", i).await;
        }
        assert!(!limiter.check_at("carol", 30).await.allowed);
        assert!(limiter.check_at("dave", 30).await.allowed);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_records() {
        let limiter = RateLimiter::in_memory(RateLimitConfig {
            max_requests: 2,
            window_ms: 60_000,
            eviction_probability: 1.0,
        });
        let now = now_ms();
        limiter.check_at("erin", now).await;
        limiter.check_at("erin", now).await;
        assert!(!limiter.check_at("erin", now).await.allowed);
    }
}
