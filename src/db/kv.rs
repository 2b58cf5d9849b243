//! `kv_entries`: the shared TTL'd key-value store.
//!
//! Expired rows read as absent and are overwritten in place; a periodic
//! [`Db::purge_expired_kv`] reclaims them.

use super::Db;
use crate::error::{Error, Result};
use crate::kv::KvStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

fn interval_secs(ttl: Duration) -> f64 {
    ttl.as_secs_f64()
}

impl Db {
    /// Delete expired KV rows. Returns how many were removed.
    pub async fn purge_expired_kv(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= now()")
            .execute(self.pool())
            .await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl KvStore for Db {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT value FROM kv_entries
             WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at)
             VALUES ($1, $2, now() + make_interval(secs => $3))
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(interval_secs(ttl))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        // An expired row restarts at 1 with no expiry, as a fresh key would.
        let (value,): (Vec<u8>,) = sqlx::query_as(
            "INSERT INTO kv_entries (key, value, expires_at)
             VALUES ($1, '1'::bytea, NULL)
             ON CONFLICT (key) DO UPDATE SET
                value = CASE
                    WHEN kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= now()
                        THEN '1'::bytea
                    ELSE convert_to(
                        (COALESCE(NULLIF(convert_from(kv_entries.value, 'UTF8'), ''), '0')::bigint + 1)::text,
                        'UTF8')
                END,
                expires_at = CASE
                    WHEN kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= now()
                        THEN NULL
                    ELSE kv_entries.expires_at
                END
             RETURNING value",
        )
        .bind(key)
        .fetch_one(self.pool())
        .await?;

        std::str::from_utf8(&value)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| Error::Cache(format!("counter {key} is not an integer")))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE kv_entries SET expires_at = now() + make_interval(secs => $2)
             WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(key)
        .bind(interval_secs(ttl))
        .execute(self.pool())
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let row: Option<(Option<DateTime<Utc>>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT expires_at, now() FROM kv_entries
             WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.and_then(|(expires_at, now)| expires_at.and_then(|at| (at - now).to_std().ok())))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = $1")
            .bind(key)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
