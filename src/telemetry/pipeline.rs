//! Mentor pipeline span helpers.
//!
//! Provides span creation and session-mode recording for dispatch cycles
//! flowing from the session buffer through the pipeline.

use tracing::Span;

/// Start a span for one dispatch cycle of a session.
///
/// The `mentor.outcome` field is declared empty and filled via
/// [`record_outcome`].
pub fn start_process_span(uid: &str, session_id: &str, trigger: &str) -> Span {
    tracing::info_span!(
        "mentor.process",
        "mentor.uid" = uid,
        "mentor.session_id" = session_id,
        "mentor.trigger" = trigger,
        "mentor.outcome" = tracing::field::Empty,
    )
}

/// Record the final outcome of a dispatch cycle on its span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("mentor.outcome", outcome);
}

/// Record a session mode transition event on the given span.
pub fn record_mode_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "session_mode_transition");
    });
}
