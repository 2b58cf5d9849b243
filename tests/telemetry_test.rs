//! Integration tests for telemetry initialization and span helpers.

use mentor_core::telemetry::{TelemetryConfig, genai, init_telemetry, metrics, pipeline};
use opentelemetry::KeyValue;

#[test]
fn telemetry_initializes_without_endpoint() {
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "mentor-test".to_string(),
        default_level: "debug".to_string(),
    };
    // Err when another test already installed the global subscriber.
    let _guard = init_telemetry(config);
}

#[test]
fn genai_chat_span_records_response() {
    let span = genai::start_chat_span("claude-sonnet-4-20250514", "anthropic", "realtime_integrations");
    genai::record_response(&span, "claude-sonnet-4-20250514", 100, 50);
}

#[test]
fn genai_embedding_span_creates() {
    let span = genai::start_embedding_span("text-embedding-3-small", "openai");
    genai::record_embedding(&span, 1536);
}

#[test]
fn process_span_records_outcome_and_transitions() {
    let span = pipeline::start_process_span("u1", "s1", "idle");
    pipeline::record_mode_transition(&span, "recording", "processing");
    pipeline::record_outcome(&span, "below_threshold");
    pipeline::record_mode_transition(&span, "processing", "idle");
}

#[test]
fn metric_instruments_accept_labels() {
    metrics::notifications_suppressed().add(1, &[KeyValue::new("reason", "daily_cap_reached")]);
    metrics::sessions_triggered().add(1, &[KeyValue::new("trigger", "bound")]);
    metrics::pipeline_duration_ms().record(12.5, &[KeyValue::new("outcome", "dispatched")]);
}
