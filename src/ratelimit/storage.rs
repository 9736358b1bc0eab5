//! The rate limiter's storage abstraction: a key/value interface with TTL
//! and an atomic increment, backed either by an in-process map with lazy
//! expiry or by Redis.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::FrameworkError;

/// A key/value store for rate-limit records, keyed by `keyPrefix + identifier`.
/// Implementations MUST lazily expire entries on `get` rather than relying on
/// a background sweep.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, FrameworkError>;
    async fn set(&self, key: &str, record: Value, ttl_sec: u64) -> Result<(), FrameworkError>;
    /// Atomically increments a numeric counter record, returning the new
    /// value, or `None` if `key` has no prior record.
    async fn incr(&self, key: &str, ttl_sec: u64) -> Result<Option<i64>, FrameworkError>;
    async fn delete(&self, key: &str) -> Result<(), FrameworkError>;
}

/// In-memory store over a per-key `DashMap`, generalized to arbitrary
/// string keys and algorithm-agnostic JSON records. Expiry is lazy: a `get`
/// past `expires_at` removes the entry and returns `None` instead of
/// relying on a periodic sweep task.
pub struct MemoryStore {
    entries: DashMap<String, (Value, Instant)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, FrameworkError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let (value, expires_at) = entry.value().clone();
        if Instant::now() >= expires_at {
            drop(entry);
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(value))
    }

    async fn set(&self, key: &str, record: Value, ttl_sec: u64) -> Result<(), FrameworkError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_sec.max(1));
        self.entries.insert(key.to_string(), (record, expires_at));
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_sec: u64) -> Result<Option<i64>, FrameworkError> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(None);
        };
        if Instant::now() >= entry.value().1 {
            drop(entry);
            self.entries.remove(key);
            return Ok(None);
        }
        let next = entry.value().0.as_i64().unwrap_or(0) + 1;
        entry.value_mut().0 = Value::from(next);
        entry.value_mut().1 = Instant::now() + Duration::from_secs(ttl_sec.max(1));
        Ok(Some(next))
    }

    async fn delete(&self, key: &str) -> Result<(), FrameworkError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Redis-backed store: values serialized as JSON text, `set` writing with
/// an expiring key (`SET ... EX`).
#[cfg(feature = "redis-store")]
pub struct RedisStore {
    client: redis::Client,
}

#[cfg(feature = "redis-store")]
impl RedisStore {
    pub fn new(url: &str) -> Result<Self, FrameworkError> {
        let client = redis::Client::open(url)
            .map_err(|e| FrameworkError::configuration(format!("invalid redis url: {e}")))?;
        Ok(RedisStore { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, FrameworkError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| FrameworkError::internal(format!("redis connection failed: {e}")))
    }
}

#[cfg(feature = "redis-store")]
#[async_trait]
impl RateLimitStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, FrameworkError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| FrameworkError::internal(format!("redis GET failed: {e}")))?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| FrameworkError::internal(format!("corrupt rate-limit record: {e}")))
    }

    async fn set(&self, key: &str, record: Value, ttl_sec: u64) -> Result<(), FrameworkError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let serialized = record.to_string();
        let () = conn
            .set_ex(key, serialized, ttl_sec.max(1))
            .await
            .map_err(|e| FrameworkError::internal(format!("redis SET EX failed: {e}")))?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_sec: u64) -> Result<Option<i64>, FrameworkError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| FrameworkError::internal(format!("redis EXISTS failed: {e}")))?;
        if !exists {
            return Ok(None);
        }
        let next: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| FrameworkError::internal(format!("redis INCR failed: {e}")))?;
        let _: bool = conn
            .expire(key, ttl_sec.max(1) as i64)
            .await
            .map_err(|e| FrameworkError::internal(format!("redis EXPIRE failed: {e}")))?;
        Ok(Some(next))
    }

    async fn delete(&self, key: &str) -> Result<(), FrameworkError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| FrameworkError::internal(format!("redis DEL failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        store.set("k", json!({"tokens": 5}), 60).await.unwrap();
        let got = store.get("k").await.unwrap();
        assert_eq!(got, Some(json!({"tokens": 5})));
    }

    #[tokio::test]
    async fn expired_entry_is_absent_on_get() {
        let store = MemoryStore::new();
        store.entries.insert(
            "k".to_string(),
            (json!({"tokens": 1}), Instant::now() - Duration::from_secs(1)),
        );
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_without_prior_record_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("missing", 60).await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_increments_an_existing_counter() {
        let store = MemoryStore::new();
        store.set("k", json!(1), 60).await.unwrap();
        assert_eq!(store.incr("k", 60).await.unwrap(), Some(2));
        assert_eq!(store.incr("k", 60).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn delete_then_get_is_none() {
        let store = MemoryStore::new();
        store.set("k", json!(1), 60).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
