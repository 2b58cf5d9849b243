//! Postgres-backed collaborators.
//!
//! One connection pool serves every port: memories, users and goals,
//! conversations, notifications, the shared KV table, and usage rollups.
//! [`PgVectorIndex`] adds pgvector search on top of it.

pub mod conversations;
pub mod kv;
pub mod memories;
pub mod notifications;
pub mod usage;
pub mod users;
pub mod vectors;

pub use vectors::PgVectorIndex;

use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// A pipeline run that cannot get a connection in this long degrades
/// like any other store failure.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit pool size (at least one connection).
    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        tracing::debug!(max_connections, "postgres pool ready");
        Ok(Self { pool })
    }

    /// Apply the mentor schema (pgvector extension included).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// pgvector text literal, e.g. `[0.1,0.2,0.3]`.
pub(crate) fn format_vector(v: &[f32]) -> String {
    let inner: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", inner.join(","))
}

/// Clamp a `usize` limit into a SQL `LIMIT` parameter.
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
