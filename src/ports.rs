//! Collaborator ports consumed by the mentor core.
//!
//! These traits are the only boundary between the pipeline and the
//! stores, indexes, and delivery channels around it. Postgres-backed
//! implementations live in [`crate::db`]; tests substitute in-memory ones.
//!
//! Object-safety note: traits use `async-trait` for async dyn-dispatch
//! and are held as `Arc<dyn Trait>`.

use crate::error::Result;
use crate::model::{Conversation, Goal, Memory, SentNotification};
use async_trait::async_trait;

/// Read access to user memories (C1).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Top memories for a user, manual first, then most recent.
    async fn get_memories(&self, uid: &str, limit: usize) -> Result<Vec<Memory>>;

    /// Hydrate memories by id, in input order where the store allows.
    async fn get_memories_by_ids(&self, uid: &str, ids: &[String]) -> Result<Vec<Memory>>;
}

/// Semantic lookup over embedded memories and conversations (C2).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search_memories_by_vector(
        &self,
        uid: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<String>>;

    async fn search_conversations(
        &self,
        uid: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<String>>;
}

/// Per-user profile lookups.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Display name; implementations fall back to a default.
    async fn get_user_name(&self, uid: &str) -> Result<String>;

    /// Mentor frequency level. `0` disables the mentor for this user.
    async fn get_mentor_frequency(&self, uid: &str) -> Result<u8>;
}

#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn get_user_goals(&self, uid: &str, limit: usize) -> Result<Vec<Goal>>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversations_by_id(&self, uid: &str, ids: &[String])
    -> Result<Vec<Conversation>>;
}

/// Push delivery to the wearer's app.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_app_notification(
        &self,
        uid: &str,
        app_name: &str,
        capability: &str,
        body: &str,
    ) -> Result<()>;
}

/// Delivered-notification history, newest first.
#[async_trait]
pub trait NotificationHistory: Send + Sync {
    async fn recent_notifications(
        &self,
        uid: &str,
        capability: &str,
        limit: usize,
    ) -> Result<Vec<SentNotification>>;
}
