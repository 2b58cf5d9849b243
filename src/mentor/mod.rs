//! The proactive mentor: context, evaluation, and the dispatch pipeline.

pub mod context;
pub mod evaluator;
pub mod pipeline;
pub mod prompts;

pub use context::{ContextBuilder, MentorContext};
pub use evaluator::{Advice, AdviceCategory, ProactiveEvaluator, ProactiveNotificationResult};
pub use pipeline::{MentorPipeline, PipelineOutcome};
