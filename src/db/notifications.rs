//! Notification delivery log and push channel.
//!
//! Sending persists the notification and emits a `NOTIFY` on
//! [`NOTIFICATION_CHANNEL`] in the same transaction; the push gateway
//! listens there.

use super::{Db, sql_limit};
use crate::error::Result;
use crate::model::SentNotification;
use crate::ports::{NotificationHistory, NotificationSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

pub const NOTIFICATION_CHANNEL: &str = "app_notification";

#[async_trait]
impl NotificationSink for Db {
    async fn send_app_notification(
        &self,
        uid: &str,
        app_name: &str,
        capability: &str,
        body: &str,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO notifications (uid, app_name, capability, body)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(uid)
        .bind(app_name)
        .bind(capability)
        .bind(body)
        .fetch_one(&mut *tx)
        .await?;

        let payload = json!({
            "id": id,
            "uid": uid,
            "app_name": app_name,
            "capability": capability,
            "body": body,
        });
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFICATION_CHANNEL)
            .bind(payload.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationHistory for Db {
    async fn recent_notifications(
        &self,
        uid: &str,
        capability: &str,
        limit: usize,
    ) -> Result<Vec<SentNotification>> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT capability, body, sent_at FROM notifications
             WHERE uid = $1 AND capability = $2
             ORDER BY sent_at DESC
             LIMIT $3",
        )
        .bind(uid)
        .bind(capability)
        .bind(sql_limit(limit))
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(capability, text, sent_at)| SentNotification {
                capability,
                text,
                sent_at,
            })
            .collect())
    }
}
