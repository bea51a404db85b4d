//! Counter storage backends
//!
//! Redis holds the counters and history lists shared by every API replica. The in-memory
//! store is used when no Redis URL is configured and in tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use hrag_core::{HragError, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::info;

/// Minimal string key-value and list operations for per-user bookkeeping
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Atomically add one and return the new value (missing keys start at 0)
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Remove keys of either kind; missing keys are ignored
    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// Append to the list at `key`, keeping only its newest `cap` items
    async fn push_capped(&self, key: &str, value: &str, cap: usize) -> Result<()>;

    /// Items of the list at `key`, oldest first
    async fn list(&self, key: &str) -> Result<Vec<String>>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;

    fn name(&self) -> &str;
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed counters
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to Redis; the manager reconnects on its own afterwards
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| HragError::StoreError(format!("Invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| HragError::StoreError(format!("Redis connection failed: {e}")))?;

        info!("Connected to Redis");
        Ok(Self { conn })
    }
}

fn redis_err(op: &str, e: redis::RedisError) -> HragError {
    HragError::StoreError(format!("Redis {op} failed: {e}"))
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| redis_err("GET", e))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| redis_err("SET", e))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1i64).await.map_err(|e| redis_err("INCR", e))
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys.to_vec())
            .await
            .map_err(|e| redis_err("DEL", e))
    }

    async fn push_capped(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        if cap == 0 {
            return Ok(());
        }
        let keep = isize::try_from(cap).unwrap_or(isize::MAX);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(key, value)
            .ignore()
            .ltrim(key, -keep, -1)
            .ignore();

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_err("RPUSH", e))
    }

    async fn list(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(key, 0, -1)
            .await
            .map_err(|e| redis_err("LRANGE", e))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| redis_err("PING", e))
    }

    fn name(&self) -> &str {
        "redis"
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local counters and lists
#[derive(Default)]
pub struct MemoryCounterStore {
    values: RwLock<HashMap<String, String>>,
    lists: RwLock<HashMap<String, VecDeque<String>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut values = self.values.write().await;
        let current = match values.get(key) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                HragError::StoreError(format!("value at '{key}' is not an integer"))
            })?,
            None => 0,
        };
        let next = current + 1;
        values.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        let mut values = self.values.write().await;
        let mut lists = self.lists.write().await;
        for key in keys {
            values.remove(key);
            lists.remove(key);
        }
        Ok(())
    }

    async fn push_capped(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        if cap == 0 {
            return Ok(());
        }
        let mut lists = self.lists.write().await;
        let list = lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        while list.len() > cap {
            list.pop_front();
        }
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .lists
            .read()
            .await
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_incr_and_delete() {
        let store = MemoryCounterStore::new();

        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));

        store.delete(&["k".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.incr("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_list_keeps_newest() {
        let store = MemoryCounterStore::new();
        for i in 0..5 {
            store.push_capped("l", &i.to_string(), 3).await.unwrap();
        }
        assert_eq!(store.list("l").await.unwrap(), vec!["2", "3", "4"]);
        assert!(store.list("missing").await.unwrap().is_empty());

        store.delete(&["l".to_string()]).await.unwrap();
        assert!(store.list("l").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_incr_rejects_non_integer() {
        let store = MemoryCounterStore::new();
        store.set("k", "yesterday").await.unwrap();
        assert!(store.incr("k").await.is_err());
    }

    #[tokio::test]
    async fn test_redis_rejects_bad_url() {
        let err = RedisCounterStore::connect("not a url").await.err().unwrap();
        assert!(matches!(err, HragError::StoreError(_)));
    }
}
