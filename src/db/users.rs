//! User profile and goal lookups.

use super::{Db, sql_limit};
use crate::error::Result;
use crate::memory::pack::DEFAULT_USER_NAME;
use crate::model::Goal;
use crate::ports::{GoalStore, UserDirectory};
use async_trait::async_trait;

impl Db {
    pub async fn upsert_user(&self, uid: &str, name: &str, mentor_frequency: u8) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (uid, name, mentor_frequency) VALUES ($1, $2, $3)
             ON CONFLICT (uid) DO UPDATE SET name = EXCLUDED.name,
                mentor_frequency = EXCLUDED.mentor_frequency",
        )
        .bind(uid)
        .bind(name)
        .bind(i16::from(mentor_frequency))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn add_goal(&self, uid: &str, title: &str) -> Result<i64> {
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO goals (uid, title) VALUES ($1, $2) RETURNING id")
                .bind(uid)
                .bind(title)
                .fetch_one(self.pool())
                .await?;
        Ok(id)
    }
}

#[async_trait]
impl UserDirectory for Db {
    async fn get_user_name(&self, uid: &str) -> Result<String> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT name FROM users WHERE uid = $1")
            .bind(uid)
            .fetch_optional(self.pool())
            .await?;
        Ok(row
            .and_then(|(name,)| name)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()))
    }

    /// Users without a profile row get the default level.
    async fn get_mentor_frequency(&self, uid: &str) -> Result<u8> {
        let row: Option<(i16,)> =
            sqlx::query_as("SELECT mentor_frequency FROM users WHERE uid = $1")
                .bind(uid)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map_or(3, |(f,)| u8::try_from(f.max(0)).unwrap_or(u8::MAX)))
    }
}

#[async_trait]
impl GoalStore for Db {
    async fn get_user_goals(&self, uid: &str, limit: usize) -> Result<Vec<Goal>> {
        let rows: Vec<(String, bool)> = sqlx::query_as(
            "SELECT title, is_active FROM goals
             WHERE uid = $1
             ORDER BY is_active DESC, created_at DESC
             LIMIT $2",
        )
        .bind(uid)
        .bind(sql_limit(limit))
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(title, is_active)| Goal { title, is_active })
            .collect())
    }
}
