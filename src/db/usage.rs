//! Daily LLM usage rollups.

use super::Db;
use crate::error::Result;
use crate::usage::{UsageRecord, UsageSink};
use async_trait::async_trait;

fn tokens(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl UsageSink for Db {
    /// Add each record to today's `(uid, feature, model)` row.
    async fn record_llm_usage(&self, records: &[UsageRecord]) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO llm_usage (uid, feature, model, day, input_tokens, output_tokens)
                 VALUES ($1, $2, $3, (now() AT TIME ZONE 'UTC')::date, $4, $5)
                 ON CONFLICT (uid, feature, model, day) DO UPDATE SET
                    input_tokens = llm_usage.input_tokens + EXCLUDED.input_tokens,
                    output_tokens = llm_usage.output_tokens + EXCLUDED.output_tokens,
                    updated_at = now()",
            )
            .bind(&record.uid)
            .bind(record.feature.as_str())
            .bind(&record.model)
            .bind(tokens(record.input_tokens))
            .bind(tokens(record.output_tokens))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
