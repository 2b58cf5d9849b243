//! pgvector similarity search over memories and conversations.

use super::{Db, format_vector, sql_limit};
use crate::error::{Error, Result};
use crate::llm::Embedder;
use crate::ports::VectorIndex;
use async_trait::async_trait;
use std::sync::Arc;

/// Embeds query text and ranks rows by cosine distance.
pub struct PgVectorIndex {
    db: Arc<Db>,
    embedder: Arc<dyn Embedder>,
}

impl PgVectorIndex {
    pub fn new(db: Arc<Db>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    async fn query_vector(&self, text: &str) -> Result<String> {
        let embedding = self.embedder.embed(text).await?;
        if embedding.is_empty() {
            return Err(Error::VectorIndex("embedder returned an empty vector".to_string()));
        }
        Ok(format_vector(&embedding))
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn search_memories_by_vector(
        &self,
        uid: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let vector = self.query_vector(query_text).await?;
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM memories
             WHERE uid = $2 AND NOT deleted AND embedding IS NOT NULL
             ORDER BY embedding <=> $1::vector
             LIMIT $3",
        )
        .bind(vector)
        .bind(uid)
        .bind(sql_limit(limit))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| Error::VectorIndex(format!("memory search failed: {e}")))?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn search_conversations(
        &self,
        uid: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let vector = self.query_vector(query_text).await?;
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM conversations
             WHERE uid = $2 AND embedding IS NOT NULL
             ORDER BY embedding <=> $1::vector
             LIMIT $3",
        )
        .bind(vector)
        .bind(uid)
        .bind(sql_limit(limit))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| Error::VectorIndex(format!("conversation search failed: {e}")))?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
