//! GenAI semantic convention span helpers for LLM operations.
//!
//! Uses OpenTelemetry GenAI semantic conventions:
//! - `gen_ai.operation.name`
//! - `gen_ai.request.model`
//! - `gen_ai.response.model`
//! - `gen_ai.provider.name`
//! - `gen_ai.usage.input_tokens`
//! - `gen_ai.usage.output_tokens`
//!
//! plus `mentor.feature`, the usage-attribution tag active for the call.

use tracing::Span;

/// Span around one evaluator completion. Response model and tokens are
/// recorded by [`record_response`] once the provider answers.
pub fn start_chat_span(model: &str, provider: &str, feature: &str) -> Span {
    tracing::info_span!(
        "gen_ai.chat",
        "gen_ai.operation.name" = "chat",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
        "gen_ai.response.model" = tracing::field::Empty,
        "gen_ai.usage.input_tokens" = tracing::field::Empty,
        "gen_ai.usage.output_tokens" = tracing::field::Empty,
        "mentor.feature" = feature,
    )
}

/// Start a span for embedding a retrieval query. The vector width is
/// filled by [`record_embedding`].
pub fn start_embedding_span(model: &str, provider: &str) -> Span {
    tracing::info_span!(
        "gen_ai.embeddings",
        "gen_ai.operation.name" = "embeddings",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
        "gen_ai.embeddings.dimension.count" = tracing::field::Empty,
    )
}

pub fn record_embedding(span: &Span, dimensions: usize) {
    span.record("gen_ai.embeddings.dimension.count", dimensions as u64);
}

/// Record the responding model and token usage on a chat span.
pub fn record_response(span: &Span, model: &str, input: u64, output: u64) {
    span.record("gen_ai.response.model", model);
    span.record("gen_ai.usage.input_tokens", input);
    span.record("gen_ai.usage.output_tokens", output);
}
