//! Metric instrument factories for mentor-core.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"mentor-core"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for mentor-core instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("mentor-core")
}

/// Counter: notifications delivered to a user.
/// Labels: `capability`.
pub fn notifications_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("mentor.notifications.dispatched")
        .with_description("Number of notifications delivered")
        .build()
}

/// Counter: candidate notifications dropped before delivery.
/// Labels: `reason`.
pub fn notifications_suppressed() -> Counter<u64> {
    meter()
        .u64_counter("mentor.notifications.suppressed")
        .with_description("Number of candidate notifications suppressed")
        .build()
}

/// Counter: prompt-data cache lookups.
/// Labels: `result` ("hit" | "miss" | "error" | "bypass").
pub fn memory_pack_cache() -> Counter<u64> {
    meter()
        .u64_counter("mentor.memory_pack.cache")
        .with_description("Prompt-data cache lookups")
        .build()
}

/// Counter: memory pack retrievals by path.
/// Labels: `path` ("semantic" | "scoring" | "fallback").
pub fn memory_pack_retrievals() -> Counter<u64> {
    meter()
        .u64_counter("mentor.memory_pack.retrievals")
        .with_description("Memory pack retrievals by retrieval path")
        .build()
}

/// Counter: sessions handed to the pipeline.
/// Labels: `trigger` ("idle" | "bound" | "immediate").
pub fn sessions_triggered() -> Counter<u64> {
    meter()
        .u64_counter("mentor.sessions.triggered")
        .with_description("Sessions dispatched to the mentor pipeline")
        .build()
}

/// Histogram: pipeline run duration in milliseconds.
/// Labels: `outcome`.
pub fn pipeline_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("mentor.pipeline.duration_ms")
        .with_description("Mentor pipeline run duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: LLM token usage.
/// Labels: `model`, `feature`, `direction` ("input" | "output").
pub fn llm_tokens() -> Counter<u64> {
    meter()
        .u64_counter("mentor.llm.tokens")
        .with_description("LLM token usage")
        .build()
}
