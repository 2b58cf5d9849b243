//! rig-core backed implementations of the model seams.
//!
//! Anthropic serves reasoning calls. Anthropic does not support embeddings
//! through rig-core, so the embedder uses an OpenAI embedding model.

use super::{Completion, Embedder, ReasoningModel};
use crate::error::{Error, Result};
use crate::telemetry::genai;
use ::rig::client::{CompletionClient, EmbeddingsClient};
use ::rig::completion::{AssistantContent, CompletionModel};
use ::rig::embeddings::EmbeddingModel;
use ::rig::providers::{anthropic, openai};
use async_trait::async_trait;
use schemars::Schema;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

/// Create an Anthropic client from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn anthropic_client(
    api_key: &SecretString,
) -> std::result::Result<anthropic::Client, ::rig::http_client::Error> {
    anthropic::Client::new(api_key.expose_secret())
}

/// Create an OpenAI client (used for embeddings) from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn openai_client(
    api_key: &SecretString,
) -> std::result::Result<openai::Client, ::rig::http_client::Error> {
    openai::Client::new(api_key.expose_secret())
}

/// Anthropic completion model behind [`ReasoningModel`].
pub struct RigReasoningModel {
    client: anthropic::Client,
    model: String,
    max_tokens: u64,
    temperature: f64,
}

impl RigReasoningModel {
    pub fn new(client: anthropic::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.3,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl ReasoningModel for RigReasoningModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        output_schema: Option<&Schema>,
    ) -> Result<Completion> {
        let model = self.client.completion_model(self.model.as_str());
        let response = model
            .completion_request(prompt.to_string())
            .preamble(system.to_string())
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .output_schema_opt(output_schema.cloned())
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;

        let text = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            model: self.model.clone(),
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }
}

/// OpenAI embedding model behind [`Embedder`].
pub struct RigEmbedder {
    client: openai::Client,
    model: String,
}

impl RigEmbedder {
    pub fn new(client: openai::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let span = genai::start_embedding_span(&self.model, "openai");
        let model = self.client.embedding_model(self.model.as_str());
        let embedding = model
            .embed_text(text)
            .instrument(span.clone())
            .await
            .map_err(|e| Error::VectorIndex(format!("embedding failed: {e}")))?;
        genai::record_embedding(&span, embedding.vec.len());
        Ok(embedding.vec.into_iter().map(|x| x as f32).collect())
    }
}
