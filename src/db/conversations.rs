//! Conversation hydration.

use super::Db;
use crate::error::Result;
use crate::model::Conversation;
use crate::ports::ConversationStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[async_trait]
impl ConversationStore for Db {
    async fn get_conversations_by_id(
        &self,
        uid: &str,
        ids: &[String],
    ) -> Result<Vec<Conversation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT id, created_at, started_at, finished_at, category, title, overview
             FROM conversations
             WHERE uid = $1 AND id = ANY($2)",
        )
        .bind(uid)
        .bind(ids)
        .fetch_all(self.pool())
        .await?;

        let mut by_id: HashMap<String, Conversation> = rows
            .into_iter()
            .map(|row| (row.id.clone(), Conversation::from(row)))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    category: String,
    title: String,
    overview: String,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            category: row.category,
            title: row.title,
            overview: row.overview,
        }
    }
}
