//! LLM token accounting per `(uid, feature, model)`.
//!
//! A task-local [`UsageContext`] names who a call is made for. It follows
//! the future across `.await` points, so any LLM call completing inside a
//! [`track_usage`] scope is attributed to that scope. Nested scopes shadow
//! the outer one for their duration.
//!
//! [`UsageTracker::on_llm_end`] is the call-end hook. With a flush function
//! it writes each record straight through; otherwise it merges into an
//! in-memory buffer that a periodic flusher drains with
//! [`UsageTracker::get_and_clear`].

use crate::error::Result;
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Attribution tag for LLM spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Chat,
    Rag,
    Goals,
    Memories,
    ConversationProcessing,
    RealtimeIntegrations,
    Notifications,
    Other,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Rag => "rag",
            Self::Goals => "goals",
            Self::Memories => "memories",
            Self::ConversationProcessing => "conversation_processing",
            Self::RealtimeIntegrations => "realtime_integrations",
            Self::Notifications => "notifications",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the current LLM calls are made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageContext {
    pub uid: String,
    pub feature: Feature,
}

tokio::task_local! {
    static USAGE_CONTEXT: UsageContext;
}

/// Run `fut` with `(uid, feature)` as the active usage context.
///
/// The context is released when `fut` completes, panics, or is dropped.
pub async fn track_usage<F>(uid: impl Into<String>, feature: Feature, fut: F) -> F::Output
where
    F: Future,
{
    let ctx = UsageContext {
        uid: uid.into(),
        feature,
    };
    USAGE_CONTEXT.scope(ctx, fut).await
}

/// The usage context of the running task, if any.
pub fn current_context() -> Option<UsageContext> {
    USAGE_CONTEXT.try_with(Clone::clone).ok()
}

/// Buffer key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub uid: String,
    pub feature: Feature,
    pub model: String,
}

impl std::fmt::Display for UsageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.uid, self.feature, self.model)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One attributed LLM call, or a merged bucket of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub uid: String,
    pub feature: Feature,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Durable destination for drained usage.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record_llm_usage(&self, records: &[UsageRecord]) -> Result<()>;
}

/// Write-through hook invoked once per attributed call.
pub type FlushFn = Arc<dyn Fn(UsageRecord) + Send + Sync>;

/// The call-end usage callback and its buffer.
#[derive(Default)]
pub struct UsageTracker {
    flush_fn: Option<FlushFn>,
    buffer: Mutex<HashMap<UsageKey, TokenCounts>>,
}

static GLOBAL: OnceLock<Arc<UsageTracker>> = OnceLock::new();

impl UsageTracker {
    /// A buffering tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// A write-through tracker; nothing is buffered.
    pub fn with_flush_fn(flush_fn: FlushFn) -> Self {
        Self {
            flush_fn: Some(flush_fn),
            buffer: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide buffering tracker bound to LLM clients at startup.
    pub fn global() -> Arc<UsageTracker> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(UsageTracker::new())))
    }

    /// Attribute a finished LLM call to the current usage context.
    ///
    /// Calls outside any scope go to `("unknown", other)`. Calls reporting
    /// no tokens at all are skipped.
    pub fn on_llm_end(&self, model: &str, input_tokens: u64, output_tokens: u64) {
        if input_tokens == 0 && output_tokens == 0 {
            return;
        }
        let ctx = current_context().unwrap_or_else(|| UsageContext {
            uid: "unknown".to_string(),
            feature: Feature::Other,
        });

        let llm_tokens = metrics::llm_tokens();
        for (direction, count) in [("input", input_tokens), ("output", output_tokens)] {
            llm_tokens.add(
                count,
                &[
                    KeyValue::new("model", model.to_string()),
                    KeyValue::new("feature", ctx.feature.as_str()),
                    KeyValue::new("direction", direction),
                ],
            );
        }

        debug!(
            uid = %ctx.uid,
            feature = %ctx.feature,
            model,
            input_tokens,
            output_tokens,
            "llm usage"
        );

        if let Some(flush) = &self.flush_fn {
            flush(UsageRecord {
                uid: ctx.uid,
                feature: ctx.feature,
                model: model.to_string(),
                input_tokens,
                output_tokens,
            });
            return;
        }

        let key = UsageKey {
            uid: ctx.uid,
            feature: ctx.feature,
            model: model.to_string(),
        };
        let mut buffer = self.buffer.lock();
        let counts = buffer.entry(key).or_default();
        counts.input_tokens += input_tokens;
        counts.output_tokens += output_tokens;
    }

    /// Take the buffered usage, leaving the buffer empty.
    pub fn get_and_clear(&self) -> HashMap<UsageKey, TokenCounts> {
        std::mem::take(&mut *self.buffer.lock())
    }

    /// Drain the buffer into `sink`. On failure the drained usage is merged
    /// back so a later drain can retry it.
    pub async fn drain_into(&self, sink: &dyn UsageSink) -> Result<usize> {
        let drained = self.get_and_clear();
        if drained.is_empty() {
            return Ok(0);
        }
        let records: Vec<UsageRecord> = drained
            .iter()
            .map(|(key, counts)| UsageRecord {
                uid: key.uid.clone(),
                feature: key.feature,
                model: key.model.clone(),
                input_tokens: counts.input_tokens,
                output_tokens: counts.output_tokens,
            })
            .collect();

        if let Err(e) = sink.record_llm_usage(&records).await {
            let mut buffer = self.buffer.lock();
            for (key, counts) in drained {
                let entry = buffer.entry(key).or_default();
                entry.input_tokens += counts.input_tokens;
                entry.output_tokens += counts.output_tokens;
            }
            return Err(e);
        }
        Ok(records.len())
    }
}
