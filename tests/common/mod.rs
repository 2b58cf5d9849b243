//! In-memory collaborators with call counters, shared by integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use mentor_core::config::MentorConfig;
use mentor_core::error::{Error, Result};
use mentor_core::gate::RateGate;
use mentor_core::kv::{KvStore, MemoryKv};
use mentor_core::llm::{Completion, ReasoningModel, TrackedModel};
use mentor_core::memory::MemoryPackAssembler;
use mentor_core::mentor::{ContextBuilder, MentorPipeline, ProactiveEvaluator};
use mentor_core::model::{Conversation, Goal, Memory, SentNotification};
use mentor_core::ports::{
    ConversationStore, GoalStore, MemoryStore, NotificationHistory, NotificationSink,
    UserDirectory, VectorIndex,
};
use mentor_core::usage::UsageTracker;
use parking_lot::Mutex;
use schemars::Schema;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const MODEL: &str = "test-model";

#[derive(Default)]
pub struct FakeMemories {
    memories: Mutex<HashMap<String, Vec<Memory>>>,
    pub get_calls: AtomicUsize,
    pub by_id_calls: AtomicUsize,
    pub last_limit: Mutex<Option<usize>>,
    pub fail: AtomicBool,
}

impl FakeMemories {
    pub fn set(&self, uid: &str, memories: Vec<Memory>) {
        self.memories.lock().insert(uid.to_string(), memories);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemoryStore for FakeMemories {
    async fn get_memories(&self, uid: &str, limit: usize) -> Result<Vec<Memory>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_limit.lock() = Some(limit);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Other("memory store down".to_string()));
        }
        let memories = self.memories.lock().get(uid).cloned().unwrap_or_default();
        Ok(memories.into_iter().take(limit).collect())
    }

    async fn get_memories_by_ids(&self, uid: &str, ids: &[String]) -> Result<Vec<Memory>> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        let memories = self.memories.lock().get(uid).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| memories.iter().find(|m| &m.id == id).cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct FakeVectors {
    pub memory_ids: Mutex<Vec<String>>,
    pub conversation_ids: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub last_query: Mutex<Option<String>>,
}

impl FakeVectors {
    pub fn failing() -> Self {
        let vectors = Self::default();
        vectors.fail.store(true, Ordering::SeqCst);
        vectors
    }
}

#[async_trait]
impl VectorIndex for FakeVectors {
    async fn search_memories_by_vector(
        &self,
        _uid: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock() = Some(query_text.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::VectorIndex("index unavailable".to_string()));
        }
        Ok(self.memory_ids.lock().iter().take(limit).cloned().collect())
    }

    async fn search_conversations(
        &self,
        _uid: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock() = Some(query_text.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::VectorIndex("index unavailable".to_string()));
        }
        Ok(self.conversation_ids.lock().iter().take(limit).cloned().collect())
    }
}

pub struct FakeUsers {
    names: Mutex<HashMap<String, String>>,
    frequencies: Mutex<HashMap<String, u8>>,
    pub default_frequency: u8,
}

impl Default for FakeUsers {
    fn default() -> Self {
        Self {
            names: Mutex::new(HashMap::new()),
            frequencies: Mutex::new(HashMap::new()),
            default_frequency: 3,
        }
    }
}

impl FakeUsers {
    pub fn set_name(&self, uid: &str, name: &str) {
        self.names.lock().insert(uid.to_string(), name.to_string());
    }

    pub fn set_frequency(&self, uid: &str, frequency: u8) {
        self.frequencies.lock().insert(uid.to_string(), frequency);
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn get_user_name(&self, uid: &str) -> Result<String> {
        Ok(self
            .names
            .lock()
            .get(uid)
            .cloned()
            .unwrap_or_else(|| "The User".to_string()))
    }

    async fn get_mentor_frequency(&self, uid: &str) -> Result<u8> {
        Ok(self
            .frequencies
            .lock()
            .get(uid)
            .copied()
            .unwrap_or(self.default_frequency))
    }
}

#[derive(Default)]
pub struct FakeGoals {
    pub goals: Mutex<Vec<Goal>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl GoalStore for FakeGoals {
    async fn get_user_goals(&self, _uid: &str, limit: usize) -> Result<Vec<Goal>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Other("goals unavailable".to_string()));
        }
        Ok(self.goals.lock().iter().take(limit).cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeConversations {
    pub conversations: Mutex<Vec<Conversation>>,
    pub requested: Mutex<Vec<String>>,
}

#[async_trait]
impl ConversationStore for FakeConversations {
    async fn get_conversations_by_id(
        &self,
        _uid: &str,
        ids: &[String],
    ) -> Result<Vec<Conversation>> {
        self.requested.lock().extend(ids.iter().cloned());
        let all = self.conversations.lock();
        Ok(ids
            .iter()
            .filter_map(|id| all.iter().find(|c| &c.id == id).cloned())
            .collect())
    }
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub uid: String,
    pub app_name: String,
    pub capability: String,
    pub body: String,
}

/// Records deliveries and serves them back as history.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<Sent>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_app_notification(
        &self,
        uid: &str,
        app_name: &str,
        capability: &str,
        body: &str,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Other("push gateway unreachable".to_string()));
        }
        self.sent.lock().push(Sent {
            uid: uid.to_string(),
            app_name: app_name.to_string(),
            capability: capability.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl NotificationHistory for RecordingSink {
    async fn recent_notifications(
        &self,
        uid: &str,
        capability: &str,
        limit: usize,
    ) -> Result<Vec<SentNotification>> {
        Ok(self
            .sent
            .lock()
            .iter()
            .rev()
            .filter(|s| s.uid == uid && s.capability == capability)
            .take(limit)
            .map(|s| SentNotification {
                capability: s.capability.clone(),
                text: s.body.clone(),
                sent_at: Utc::now(),
            })
            .collect())
    }
}

/// A reasoning model that replays a fixed response.
#[derive(Clone)]
pub struct ScriptedModel {
    response: Arc<Mutex<String>>,
    pub calls: Arc<AtomicUsize>,
    pub last_prompt: Arc<Mutex<Option<(String, String)>>>,
    /// Output schema of the last call, as JSON.
    pub last_schema: Arc<Mutex<Option<serde_json::Value>>>,
    pub fail: Arc<AtomicBool>,
}

impl ScriptedModel {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Arc::new(Mutex::new(response.into())),
            calls: Arc::new(AtomicUsize::new(0)),
            last_prompt: Arc::new(Mutex::new(None)),
            last_schema: Arc::new(Mutex::new(None)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn respond(&self, response: impl Into<String>) {
        *self.response.lock() = response.into();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningModel for ScriptedModel {
    fn model_name(&self) -> &str {
        MODEL
    }

    fn provider(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        output_schema: Option<&Schema>,
    ) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some((system.to_string(), prompt.to_string()));
        *self.last_schema.lock() = output_schema.map(|s| s.as_value().clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Llm("model overloaded".to_string()));
        }
        Ok(Completion {
            text: self.response.lock().clone(),
            model: String::new(),
            input_tokens: 1200,
            output_tokens: 80,
        })
    }
}

/// Counts reads and writes through to an in-process store. With `fail`
/// set, every operation errors after being counted.
#[derive(Default)]
pub struct CountingKv {
    pub inner: MemoryKv,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingKv {
    pub fn failing() -> Self {
        let kv = Self::default();
        kv.fail.store(true, Ordering::SeqCst);
        kv
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.available()
    }

    fn write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.available()
    }

    fn available(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Cache("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for CountingKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read()?;
        self.inner.get(key).await
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()> {
        self.write()?;
        self.inner.setex(key, ttl, value).await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.write()?;
        self.inner.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.write()?;
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.read()?;
        self.inner.ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.write()?;
        self.inner.delete(key).await
    }
}

/// Evaluator JSON with advice.
pub fn advice_json(text: &str, confidence: f64) -> String {
    serde_json::json!({
        "has_advice": true,
        "advice": {
            "notification_text": text,
            "reasoning": "scripted",
            "confidence": confidence,
            "category": "timely_nudge",
        },
        "context_summary": "scripted conversation",
    })
    .to_string()
}

pub fn no_advice_json() -> String {
    r#"{"has_advice": false, "advice": null, "context_summary": "small talk"}"#.to_string()
}

/// A full pipeline over fakes. The KV store is shared by the cache and the gate.
pub struct Harness {
    pub config: MentorConfig,
    pub memories: Arc<FakeMemories>,
    pub vectors: Arc<FakeVectors>,
    pub users: Arc<FakeUsers>,
    pub goals: Arc<FakeGoals>,
    pub conversations: Arc<FakeConversations>,
    pub sink: Arc<RecordingSink>,
    pub kv: Arc<MemoryKv>,
    pub gate: Arc<RateGate>,
    pub model: ScriptedModel,
    pub usage: Arc<UsageTracker>,
    pub pipeline: Arc<MentorPipeline>,
}

impl Harness {
    pub fn new(response: impl Into<String>) -> Self {
        Self::with_config(MentorConfig::default(), response)
    }

    pub fn with_config(config: MentorConfig, response: impl Into<String>) -> Self {
        let memories = Arc::new(FakeMemories::default());
        let vectors = Arc::new(FakeVectors::default());
        let users = Arc::new(FakeUsers::default());
        let goals = Arc::new(FakeGoals::default());
        let conversations = Arc::new(FakeConversations::default());
        let sink = Arc::new(RecordingSink::default());
        let kv = Arc::new(MemoryKv::new());
        let usage = Arc::new(UsageTracker::new());
        let model = ScriptedModel::new(response);

        let assembler = Arc::new(MemoryPackAssembler::new(
            memories.clone(),
            Some(vectors.clone()),
            users.clone(),
            kv.clone(),
        ));
        let gate = Arc::new(RateGate::new(kv.clone(), config.daily_max));
        let context = ContextBuilder::new(
            assembler,
            users.clone(),
            goals.clone(),
            Some(vectors.clone()),
            conversations.clone(),
            sink.clone(),
            config.memory_k,
        );
        let evaluator = ProactiveEvaluator::new(Arc::new(TrackedModel::new(
            model.clone(),
            Arc::clone(&usage),
        )));
        let pipeline = Arc::new(MentorPipeline::new(
            &config,
            users.clone(),
            Arc::clone(&gate),
            context,
            evaluator,
            sink.clone(),
        ));

        Self {
            config,
            memories,
            vectors,
            users,
            goals,
            conversations,
            sink,
            kv,
            gate,
            model,
            usage,
            pipeline,
        }
    }
}
