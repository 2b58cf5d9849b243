//! LLM provider setup via rig-core, and the model seams the pipeline uses.
//!
//! [`ReasoningModel`] is a single prompt-in, text-out call that reports its
//! token usage. [`Embedder`] turns query text into a vector for the index.
//! [`TrackedModel`] wraps any reasoning model and fires the usage callback
//! when each call ends.
//!
//! # Example
//! ```no_run
//! use mentor_core::llm::{RigReasoningModel, anthropic_client};
//! use secrecy::SecretString;
//!
//! let key = SecretString::from("sk-ant-...");
//! let client = anthropic_client(&key).expect("failed to create Anthropic client");
//! let model = RigReasoningModel::new(client, "claude-sonnet-4-20250514");
//! ```

pub mod provider;

pub use provider::{RigEmbedder, RigReasoningModel, anthropic_client, openai_client};

use crate::error::Result;
use crate::telemetry::genai;
use crate::usage::{Feature, UsageTracker, current_context};
use async_trait::async_trait;
use schemars::Schema;
use std::sync::Arc;
use tracing::Instrument;

/// Text returned by a reasoning call plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model that served the call; empty when the provider did not say.
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[async_trait]
pub trait ReasoningModel: Send + Sync {
    /// Model identifier requested by this client.
    fn model_name(&self) -> &str;

    /// Provider label for telemetry.
    fn provider(&self) -> &str;

    /// One completion. With `output_schema`, the provider constrains the
    /// reply to JSON matching it and `Completion::text` carries that JSON.
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        output_schema: Option<&Schema>,
    ) -> Result<Completion>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A reasoning model whose calls are attributed to the active usage context.
pub struct TrackedModel<M> {
    inner: M,
    usage: Arc<UsageTracker>,
}

impl<M: ReasoningModel> TrackedModel<M> {
    pub fn new(inner: M, usage: Arc<UsageTracker>) -> Self {
        Self { inner, usage }
    }
}

#[async_trait]
impl<M: ReasoningModel> ReasoningModel for TrackedModel<M> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        output_schema: Option<&Schema>,
    ) -> Result<Completion> {
        let feature = current_context().map_or(Feature::Other, |ctx| ctx.feature);
        let span = genai::start_chat_span(self.inner.model_name(), self.inner.provider(), feature.as_str());

        let completion = self
            .inner
            .complete(system, prompt, output_schema)
            .instrument(span.clone())
            .await?;

        // Providers that omit the served model are billed under the request model.
        let model = if completion.model.is_empty() || completion.model == "unknown" {
            self.inner.model_name()
        } else {
            completion.model.as_str()
        };
        genai::record_response(&span, model, completion.input_tokens, completion.output_tokens);
        self.usage
            .on_llm_end(model, completion.input_tokens, completion.output_tokens);
        Ok(completion)
    }
}
