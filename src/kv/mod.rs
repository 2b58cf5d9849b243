//! Key-value store with per-key TTL.
//!
//! Backs the prompt-data cache and the shared tier of the rate-limit gate.
//! [`MemoryKv`] serves single-instance deployments and tests; the shared
//! multi-instance store is [`crate::db::Db`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set `key` to `value`, expiring after `ttl`.
    async fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()>;

    /// Increment an integer counter, creating it at 1. Keeps any existing TTL.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Set a TTL on an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining TTL, or `None` if the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process TTL map.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.live(now) {
                    e.value = b"0".to_vec();
                    e.expires_at = None;
                }
            })
            .or_insert_with(|| Entry {
                value: b"0".to_vec(),
                expires_at: None,
            });
        let current: i64 = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Cache(format!("value at {key} is not an integer")))?;
        let next = current + 1;
        entry.value = next.to_string().into_bytes();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.live(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .filter(|e| e.live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn setex_expires_after_ttl() {
        let kv = MemoryKv::new();
        kv.setex("k", Duration::from_secs(10), b"v").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some(&b"v"[..]));
        assert_eq!(kv.ttl("k").await.unwrap(), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(kv.get("k").await.unwrap().is_none());
        assert!(kv.ttl("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn incr_counts_and_keeps_ttl() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("c").await.unwrap(), 1);
        assert!(kv.expire("c", Duration::from_secs(5)).await.unwrap());
        assert_eq!(kv.incr("c").await.unwrap(), 2);
        assert_eq!(kv.ttl("c").await.unwrap(), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(kv.incr("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn incr_rejects_non_integer() {
        let kv = MemoryKv::new();
        kv.setex("s", Duration::from_secs(60), b"abc").await.unwrap();
        assert!(kv.incr("s").await.is_err());
    }
}
