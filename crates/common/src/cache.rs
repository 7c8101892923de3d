//! Key-value cache abstraction.
//!
//! Content snapshots, list caches and moderation counters all live behind
//! [`CacheStore`]. Production uses [`RedisCache`]; tests and single-process
//! setups use [`MemoryCache`].

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::{KeysInterface, LuaInterface};
use fred::types::Expiration;
use fred::types::Key;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Increments a counter and sets its expiry only when it has none yet.
const INCR_WITH_EXPIRY_SCRIPT: &str = r"
local total = redis.call('INCRBY', KEYS[1], ARGV[1])
if redis.call('TTL', KEYS[1]) < 0 then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return total
";

/// Number of keys requested per SCAN round-trip.
const SCAN_PAGE_SIZE: u32 = 100;

/// Cache operations used by the moderation pipeline.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a string value.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a string value with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Delete a key. Returns whether it existed.
    async fn del(&self, key: &str) -> AppResult<bool>;

    /// Delete every key matching a glob pattern (`*` wildcard). Returns the count removed.
    async fn scan_delete(&self, pattern: &str) -> AppResult<u64>;

    /// Atomically add `by` to a counter, setting `ttl` only when the key has no expiry.
    ///
    /// Returns the post-increment total.
    async fn incr_with_expiry(&self, key: &str, by: i64, ttl: Duration) -> AppResult<i64>;
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    redis: Arc<RedisClient>,
}

impl RedisCache {
    /// Create a new Redis cache.
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let value: Option<String> = self.redis.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.redis
            .set::<(), _, _>(
                key,
                value,
                Some(Expiration::EX(ttl.as_secs().max(1) as i64)),
                None,
                false,
            )
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> AppResult<bool> {
        let removed: i64 = self.redis.del(key).await?;
        Ok(removed > 0)
    }

    async fn scan_delete(&self, pattern: &str) -> AppResult<u64> {
        let keys: Vec<Key> = self
            .redis
            .scan_buffered(pattern, Some(SCAN_PAGE_SIZE), None)
            .try_collect()
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let mut removed = 0u64;
        for chunk in keys.chunks(SCAN_PAGE_SIZE as usize) {
            let count: i64 = self.redis.del(chunk.to_vec()).await?;
            removed += count.max(0) as u64;
        }

        debug!(pattern = %pattern, removed, "Scan-deleted cache keys");
        Ok(removed)
    }

    async fn incr_with_expiry(&self, key: &str, by: i64, ttl: Duration) -> AppResult<i64> {
        let total: i64 = self
            .redis
            .eval(
                INCR_WITH_EXPIRY_SCRIPT,
                vec![key.to_string()],
                vec![by.to_string(), ttl.as_secs().max(1).to_string()],
            )
            .await?;
        Ok(total)
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process cache with the same semantics as [`RedisCache`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time-to-live of a key, if it has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Whether a live key exists.
    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        entries.get(key).is_some_and(|e| e.is_live(Instant::now()))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> AppResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn scan_delete(&self, pattern: &str) -> AppResult<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    async fn incr_with_expiry(&self, key: &str, by: i64, ttl: Duration) -> AppResult<i64> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry {
                value: "0".to_string(),
                expires_at: None,
            });
        if !entry.is_live(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }

        let current: i64 = entry.value.parse().map_err(|_| {
            AppError::Redis(format!("value at {key} is not an integer"))
        })?;
        let total = current + by;
        entry.value = total.to_string();
        if entry.expires_at.is_none() {
            entry.expires_at = Some(now + ttl);
        }
        Ok(total)
    }
}

/// Match a key against a glob pattern where `*` matches any run of characters.
fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
