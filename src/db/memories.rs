//! Memory reads for prompt packs.

use super::{Db, sql_limit};
use crate::error::Result;
use crate::model::{Memory, MemoryCategory};
use crate::ports::MemoryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const MEMORY_COLUMNS: &str = "id, content, category, manually_added, visibility, tags, \
                              user_review, created_at, updated_at";

impl Db {
    /// Store a memory, with an optional embedding for vector search.
    pub async fn store_memory(
        &self,
        uid: &str,
        memory: &Memory,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO memories
                (id, uid, content, category, manually_added, visibility, tags, user_review, embedding)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::vector)
             ON CONFLICT (id) DO UPDATE SET
                content = EXCLUDED.content,
                category = EXCLUDED.category,
                manually_added = EXCLUDED.manually_added,
                visibility = EXCLUDED.visibility,
                tags = EXCLUDED.tags,
                user_review = EXCLUDED.user_review,
                embedding = COALESCE(EXCLUDED.embedding, memories.embedding),
                updated_at = now()",
        )
        .bind(&memory.id)
        .bind(uid)
        .bind(&memory.content)
        .bind(memory.category.as_str())
        .bind(memory.manually_added)
        .bind(&memory.visibility)
        .bind(&memory.tags)
        .bind(memory.user_review)
        .bind(embedding.map(super::format_vector))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for Db {
    async fn get_memories(&self, uid: &str, limit: usize) -> Result<Vec<Memory>> {
        let rows: Vec<MemoryRow> = sqlx::query_as(&format!(
            "SELECT {MEMORY_COLUMNS}
             FROM memories
             WHERE uid = $1 AND NOT deleted AND user_review IS DISTINCT FROM false
             ORDER BY manually_added DESC, created_at DESC
             LIMIT $2"
        ))
        .bind(uid)
        .bind(sql_limit(limit))
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Memory::from).collect())
    }

    async fn get_memories_by_ids(&self, uid: &str, ids: &[String]) -> Result<Vec<Memory>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<MemoryRow> = sqlx::query_as(&format!(
            "SELECT {MEMORY_COLUMNS}
             FROM memories
             WHERE uid = $1 AND id = ANY($2) AND NOT deleted"
        ))
        .bind(uid)
        .bind(ids)
        .fetch_all(self.pool())
        .await?;

        // Restore the caller's (relevance) order.
        let mut by_id: HashMap<String, Memory> = rows
            .into_iter()
            .map(|row| (row.id.clone(), Memory::from(row)))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct MemoryRow {
    id: String,
    content: String,
    category: String,
    manually_added: bool,
    visibility: String,
    tags: Vec<String>,
    user_review: Option<bool>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MemoryRow> for Memory {
    fn from(row: MemoryRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            category: MemoryCategory::from_label(&row.category),
            manually_added: row.manually_added,
            visibility: row.visibility,
            tags: row.tags,
            user_review: row.user_review,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}
