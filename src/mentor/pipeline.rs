//! Mentor pipeline: gate, context, evaluate, validate, dispatch, record.
//!
//! The frequency and gate checks run before any LLM work. The whole run is
//! attributed to the user under the `realtime_integrations` feature.

use super::context::{ContextBuilder, MentorContext};
use super::evaluator::ProactiveEvaluator;
use crate::config::MentorConfig;
use crate::error::Result;
use crate::gate::{Capability, Decision, DenyReason, RateGate};
use crate::model::TranscriptSegment;
use crate::ports::{NotificationSink, UserDirectory};
use crate::scheduler::SessionProcessor;
use crate::session::ProcessingJob;
use crate::telemetry::metrics;
use crate::telemetry::pipeline::record_outcome;
use crate::usage::{Feature, track_usage};
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Span, error, info, warn};

pub const MIN_NOTIFICATION_CHARS: usize = 5;
pub const MAX_NOTIFICATION_CHARS: usize = 150;

/// How one pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Frequency 0, or the frequency could not be read.
    Disabled,
    /// The user's frequency has no configured threshold.
    Unmapped(u8),
    Denied(DenyReason),
    NoAdvice,
    BelowThreshold { confidence: f64, threshold: f64 },
    InvalidText,
    DispatchFailed,
    Dispatched { text: String },
}

impl PipelineOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Unmapped(_) => "unmapped_frequency",
            Self::Denied(reason) => reason.as_str(),
            Self::NoAdvice => "no_advice",
            Self::BelowThreshold { .. } => "below_threshold",
            Self::InvalidText => "invalid_text",
            Self::DispatchFailed => "dispatch_failed",
            Self::Dispatched { .. } => "dispatched",
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

pub struct MentorPipeline {
    users: Arc<dyn UserDirectory>,
    gate: Arc<RateGate>,
    context: ContextBuilder,
    evaluator: ProactiveEvaluator,
    sink: Arc<dyn NotificationSink>,
    capability: Capability,
    config: MentorConfig,
}

impl MentorPipeline {
    pub fn new(
        config: &MentorConfig,
        users: Arc<dyn UserDirectory>,
        gate: Arc<RateGate>,
        context: ContextBuilder,
        evaluator: ProactiveEvaluator,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            users,
            gate,
            context,
            evaluator,
            sink,
            capability: Capability::mentor(config),
            config: config.clone(),
        }
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Run one candidate notification for `uid` through every stage.
    pub async fn run(
        &self,
        uid: &str,
        accumulated_text: &str,
        messages: &[TranscriptSegment],
    ) -> PipelineOutcome {
        let start = Instant::now();
        let outcome = track_usage(uid, Feature::RealtimeIntegrations, async {
            self.run_stages(uid, accumulated_text, messages).await
        })
        .await;

        let label = outcome.as_str();
        record_outcome(&Span::current(), label);
        metrics::pipeline_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("outcome", label)],
        );
        if outcome.is_dispatched() {
            metrics::notifications_dispatched()
                .add(1, &[KeyValue::new("capability", self.capability.name.clone())]);
        } else {
            metrics::notifications_suppressed().add(1, &[KeyValue::new("reason", label)]);
        }
        outcome
    }

    async fn run_stages(
        &self,
        uid: &str,
        accumulated_text: &str,
        messages: &[TranscriptSegment],
    ) -> PipelineOutcome {
        let frequency = match self.users.get_mentor_frequency(uid).await {
            Ok(f) => f,
            Err(e) => {
                warn!(uid, error = %e, "mentor frequency unavailable");
                return PipelineOutcome::Disabled;
            }
        };
        if frequency == 0 {
            info!(uid, reason = "disabled", "mentor suppressed");
            return PipelineOutcome::Disabled;
        }

        let Some(threshold) = self.config.threshold_for(frequency) else {
            error!(uid, frequency, "no confidence threshold configured for frequency");
            return PipelineOutcome::Unmapped(frequency);
        };

        if let Decision::Deny(reason) = self.gate.check(uid, &self.capability).await {
            info!(uid, reason = reason.as_str(), "mentor suppressed");
            return PipelineOutcome::Denied(reason);
        }

        let ctx: MentorContext = self
            .context
            .build(uid, &self.capability.name, frequency, messages)
            .await;

        let text = if accumulated_text.trim().is_empty() {
            super::context::conversation_query(messages)
        } else {
            accumulated_text.to_string()
        };

        let Some(advice) = self.evaluator.evaluate(uid, &ctx, &text).await else {
            info!(uid, reason = "no_advice", "mentor suppressed");
            return PipelineOutcome::NoAdvice;
        };

        if advice.confidence < threshold {
            info!(
                uid,
                reason = "below_threshold",
                confidence = advice.confidence,
                threshold,
                "mentor suppressed"
            );
            return PipelineOutcome::BelowThreshold {
                confidence: advice.confidence,
                threshold,
            };
        }

        let Some(body) = validate_text(&advice.notification_text) else {
            info!(uid, reason = "invalid_text", "mentor suppressed");
            return PipelineOutcome::InvalidText;
        };

        if let Err(e) = self
            .sink
            .send_app_notification(uid, &self.config.app_name, &self.capability.name, &body)
            .await
        {
            warn!(uid, error = %e, "mentor notification dispatch failed");
            return PipelineOutcome::DispatchFailed;
        }

        self.gate.record(uid, &self.capability).await;
        info!(
            uid,
            category = advice.category.as_str(),
            confidence = advice.confidence,
            "mentor notification sent"
        );
        PipelineOutcome::Dispatched { text: body }
    }
}

#[async_trait]
impl SessionProcessor for MentorPipeline {
    async fn process(&self, job: ProcessingJob) -> Result<()> {
        self.run(&job.uid, &job.accumulated_text, &job.messages).await;
        Ok(())
    }
}

/// Trimmed text of at least the minimum length, truncated to the maximum.
pub fn validate_text(text: &str) -> Option<String> {
    let text = text.trim();
    let len = text.chars().count();
    if len < MIN_NOTIFICATION_CHARS {
        return None;
    }
    if len > MAX_NOTIFICATION_CHARS {
        return Some(text.chars().take(MAX_NOTIFICATION_CHARS).collect());
    }
    Some(text.to_string())
}
