//! Shared key-value store
//!
//! The L2 cache tier, job records, and WS tickets all sit behind this trait.
//! Production uses Redis; dev and tests use the in-memory implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv connection error: {0}")]
    Connection(String),

    #[error("kv operation error: {0}")]
    Operation(String),
}

#[async_trait]
pub trait SharedKv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_s: u64) -> Result<(), KvError>;

    async fn del(&self, key: &str) -> Result<(), KvError>;

    /// Get-and-delete in one step. Used for single-use WS tickets so a
    /// ticket can never be redeemed twice.
    async fn take(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Set only if the key does not exist. Returns whether this caller won.
    /// Used as the at-most-once guard for stale-marking.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_s: u64) -> Result<bool, KvError>;

    /// Keys matching a prefix. Only the dev store supports cheap scans; the
    /// Redis implementation uses SCAN and is intended for the low-volume
    /// stale sweeper, not hot paths.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

// ============================================================================
// Redis implementation
// ============================================================================

pub struct RedisKv {
    manager: redis::aio::ConnectionManager,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client =
            redis::Client::open(url).map_err(|e| KvError::Connection(e.to_string()))?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl SharedKv for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::Operation(e.to_string()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_s: u64) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_s)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| KvError::Operation(e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| KvError::Operation(e.to_string()))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.manager.clone();
        // GETDEL is atomic; a second taker sees nil.
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::Operation(e.to_string()))
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_s: u64) -> Result<bool, KvError> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_s)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::Operation(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{prefix}*"))
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| KvError::Operation(e.to_string()))?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}

// ============================================================================
// In-memory implementation (dev / tests)
// ============================================================================

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct MemoryKv {
    map: DashMap<String, MemoryEntry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let entry = self.map.get(key)?;
        if let Some(expires_at) = entry.expires_at {
            if Instant::now() >= expires_at {
                drop(entry);
                self.map.remove(key);
                return None;
            }
        }
        Some(entry.value.clone())
    }
}

#[async_trait]
impl SharedKv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.live_value(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_s: u64) -> Result<(), KvError> {
        let expires_at =
            (ttl_s > 0).then(|| Instant::now() + Duration::from_secs(ttl_s));
        self.map
            .insert(key.to_string(), MemoryEntry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        self.map.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let value = self.live_value(key);
        if value.is_some() {
            self.map.remove(key);
        }
        Ok(value)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_s: u64) -> Result<bool, KvError> {
        if self.live_value(key).is_some() {
            return Ok(false);
        }
        let expires_at = (ttl_s > 0).then(|| Instant::now() + Duration::from_secs(ttl_s));
        // DashMap entry keeps the check-and-insert atomic per key.
        match self.map.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(MemoryEntry { value: value.to_string(), expires_at });
                Ok(true)
            }
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .map
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_kv_round_trip_and_ttl() {
        let kv = MemoryKv::new();
        kv.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".to_string()));
        kv.del("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn take_is_single_use() {
        let kv = MemoryKv::new();
        kv.set_ex("ticket", "session-1", 60).await.unwrap();
        assert_eq!(kv.take("ticket").await.unwrap(), Some("session-1".to_string()));
        assert_eq!(kv.take("ticket").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefix_scan_finds_keys() {
        let kv = MemoryKv::new();
        kv.set_ex("job:a", "1", 60).await.unwrap();
        kv.set_ex("job:b", "2", 60).await.unwrap();
        kv.set_ex("other:c", "3", 60).await.unwrap();
        let mut keys = kv.keys_with_prefix("job:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["job:a".to_string(), "job:b".to_string()]);
    }
}
