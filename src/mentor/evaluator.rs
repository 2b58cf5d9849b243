//! Proactive evaluator: one structured-output reasoning call per dispatch.
//!
//! The request carries the JSON schema of [`ProactiveNotificationResult`],
//! so the provider constrains the reply to that shape; [`ProactiveNotificationResult::parse`]
//! still validates what comes back. Never fails: model errors, unparseable
//! output, and out-of-range values all come back as "no advice".

use super::context::MentorContext;
use super::prompts;
use crate::llm::ReasoningModel;
use schemars::{JsonSchema, Schema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cap on the live conversation text placed in the prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 128_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdviceCategory {
    GoalConnection,
    DotConnecting,
    TimelyNudge,
    EmotionalSupport,
    ArgumentPerspective,
    #[serde(other)]
    Other,
}

impl AdviceCategory {
    pub const KNOWN: [AdviceCategory; 5] = [
        Self::GoalConnection,
        Self::DotConnecting,
        Self::TimelyNudge,
        Self::EmotionalSupport,
        Self::ArgumentPerspective,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoalConnection => "goal_connection",
            Self::DotConnecting => "dot_connecting",
            Self::TimelyNudge => "timely_nudge",
            Self::EmotionalSupport => "emotional_support",
            Self::ArgumentPerspective => "argument_perspective",
            Self::Other => "other",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GoalConnection => "the conversation bears on one of the user's goals",
            Self::DotConnecting => "links this conversation to something from their past",
            Self::TimelyNudge => "a reminder or prompt that matters right now",
            Self::EmotionalSupport => "the user sounds stressed, down, or overwhelmed",
            Self::ArgumentPerspective => "a disagreement where another angle would help",
            Self::Other => "anything else worth saying",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Advice {
    pub notification_text: String,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f64,
    pub category: AdviceCategory,
}

/// Structured evaluator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProactiveNotificationResult {
    pub has_advice: bool,
    #[serde(default)]
    pub advice: Option<Advice>,
    #[serde(default)]
    pub context_summary: String,
}

impl ProactiveNotificationResult {
    /// Parse model output, tolerating a fenced code block around the JSON.
    ///
    /// `has_advice = false` discards any advice the model attached.
    /// Returns `None` for malformed output or an out-of-range confidence.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut result: Self = serde_json::from_str(strip_fences(raw)).ok()?;
        if !result.has_advice {
            result.advice = None;
        }
        if let Some(advice) = &result.advice
            && !(0.0..=1.0).contains(&advice.confidence)
        {
            return None;
        }
        Some(result)
    }
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

impl ProactiveNotificationResult {
    /// JSON schema sent with every evaluator request.
    pub fn output_schema() -> Schema {
        schemars::schema_for!(ProactiveNotificationResult)
    }
}

pub struct ProactiveEvaluator {
    model: Arc<dyn ReasoningModel>,
    schema: Schema,
}

impl ProactiveEvaluator {
    pub fn new(model: Arc<dyn ReasoningModel>) -> Self {
        Self {
            model,
            schema: ProactiveNotificationResult::output_schema(),
        }
    }

    /// Ask the model whether to notify. `None` means stay silent.
    pub async fn evaluate(
        &self,
        uid: &str,
        ctx: &MentorContext,
        accumulated_text: &str,
    ) -> Option<Advice> {
        let system = prompts::system_prompt(&ctx.user_name, ctx.frequency);
        let conversation = clip_chars(accumulated_text, MAX_PROMPT_CHARS);
        let prompt = prompts::user_prompt(ctx, conversation);

        let completion = match self
            .model
            .complete(&system, &prompt, Some(&self.schema))
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(uid, error = %e, "evaluator call failed");
                return None;
            }
        };

        let Some(result) = ProactiveNotificationResult::parse(&completion.text) else {
            info!(uid, reason = "malformed_output", "evaluator output discarded");
            return None;
        };
        debug!(
            uid,
            has_advice = result.has_advice,
            summary = %result.context_summary,
            "evaluator result"
        );
        result.advice
    }
}

fn clip_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
