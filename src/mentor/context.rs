//! Evaluator context assembly.
//!
//! Every source degrades to an empty value on failure; the evaluator is
//! expected to cope with missing context.

use super::prompts;
use crate::memory::MemoryPackAssembler;
use crate::memory::pack::DEFAULT_USER_NAME;
use crate::model::{Goal, SentNotification, TranscriptSegment};
use crate::ports::{ConversationStore, GoalStore, NotificationHistory, UserDirectory, VectorIndex};
use std::sync::Arc;
use tracing::{debug, warn};

/// Goals fetched per user before filtering to active ones.
const GOALS_FETCHED: usize = 10;
const GOALS_KEPT: usize = 3;
/// Query text sent to the conversation index, in characters.
const CONVERSATION_QUERY_MAX: usize = 2000;
const CONVERSATIONS_KEPT: usize = 3;
const RECENT_NOTIFICATIONS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MentorContext {
    pub user_name: String,
    /// Formatted memory pack.
    pub memories: String,
    /// Up to three active goals.
    pub goals: Vec<Goal>,
    /// Rendered related conversations, or empty.
    pub past_conversations: String,
    /// Newest first.
    pub recent_notifications: Vec<SentNotification>,
    pub frequency: u8,
}

pub struct ContextBuilder {
    assembler: Arc<MemoryPackAssembler>,
    users: Arc<dyn UserDirectory>,
    goals: Arc<dyn GoalStore>,
    vectors: Option<Arc<dyn VectorIndex>>,
    conversations: Arc<dyn ConversationStore>,
    history: Arc<dyn NotificationHistory>,
    memory_k: usize,
}

impl ContextBuilder {
    pub fn new(
        assembler: Arc<MemoryPackAssembler>,
        users: Arc<dyn UserDirectory>,
        goals: Arc<dyn GoalStore>,
        vectors: Option<Arc<dyn VectorIndex>>,
        conversations: Arc<dyn ConversationStore>,
        history: Arc<dyn NotificationHistory>,
        memory_k: usize,
    ) -> Self {
        Self {
            assembler,
            users,
            goals,
            vectors,
            conversations,
            history,
            memory_k,
        }
    }

    pub async fn build(
        &self,
        uid: &str,
        capability: &str,
        frequency: u8,
        messages: &[TranscriptSegment],
    ) -> MentorContext {
        // Scoring path only: the live conversation must not bias retrieval.
        let (user_name, memories) = match self
            .assembler
            .get_prompt_memories(uid, self.memory_k, None)
            .await
        {
            Ok((name, formatted, _)) => (name, formatted),
            Err(e) => {
                warn!(uid, error = %e, "memory pack unavailable for mentor context");
                (self.user_name(uid).await, String::new())
            }
        };

        let goals = self.active_goals(uid).await;
        let past_conversations = self.past_conversations(uid, messages).await;
        let recent_notifications = self.recent_notifications(uid, capability).await;

        debug!(
            uid,
            goals = goals.len(),
            past_conversations = !past_conversations.is_empty(),
            recent_notifications = recent_notifications.len(),
            "mentor context built"
        );

        MentorContext {
            user_name,
            memories,
            goals,
            past_conversations,
            recent_notifications,
            frequency,
        }
    }

    async fn user_name(&self, uid: &str) -> String {
        match self.users.get_user_name(uid).await {
            Ok(name) if !name.trim().is_empty() => name,
            _ => DEFAULT_USER_NAME.to_string(),
        }
    }

    async fn active_goals(&self, uid: &str) -> Vec<Goal> {
        match self.goals.get_user_goals(uid, GOALS_FETCHED).await {
            Ok(goals) => goals
                .into_iter()
                .filter(|g| g.is_active)
                .take(GOALS_KEPT)
                .collect(),
            Err(e) => {
                warn!(uid, error = %e, "goals unavailable for mentor context");
                Vec::new()
            }
        }
    }

    async fn past_conversations(&self, uid: &str, messages: &[TranscriptSegment]) -> String {
        let Some(vectors) = &self.vectors else {
            return String::new();
        };
        let query = conversation_query(messages);
        if query.is_empty() {
            return String::new();
        }

        let ids = match vectors
            .search_conversations(uid, &query, CONVERSATIONS_KEPT)
            .await
        {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => return String::new(),
            Err(e) => {
                warn!(uid, error = %e, "conversation search failed");
                return String::new();
            }
        };

        let ids: Vec<String> = ids.into_iter().take(CONVERSATIONS_KEPT).collect();
        match self.conversations.get_conversations_by_id(uid, &ids).await {
            Ok(conversations) => prompts::past_conversations(&conversations),
            Err(e) => {
                warn!(uid, error = %e, "conversation hydration failed");
                String::new()
            }
        }
    }

    async fn recent_notifications(&self, uid: &str, capability: &str) -> Vec<SentNotification> {
        self.history
            .recent_notifications(uid, capability, RECENT_NOTIFICATIONS)
            .await
            .unwrap_or_else(|e| {
                warn!(uid, error = %e, "notification history unavailable");
                Vec::new()
            })
    }
}

/// Segment texts joined by spaces, cut to the query limit on a char boundary.
pub fn conversation_query(messages: &[TranscriptSegment]) -> String {
    let joined = messages
        .iter()
        .map(|m| m.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    joined.chars().take(CONVERSATION_QUERY_MAX).collect()
}
