//! Process-level wiring: segment buffer, idle scheduler, usage drain.

use crate::config::MentorConfig;
use crate::model::TranscriptSegment;
use crate::scheduler::{IdleScheduler, SchedulerConfig, SessionProcessor};
use crate::session::{AppendOutcome, PhraseTrigger, SegmentBuffer, SessionSnapshot, TriggerDetector};
use crate::usage::{UsageSink, UsageTracker};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct MentorService {
    buffer: Arc<SegmentBuffer>,
    scheduler: IdleScheduler,
    usage: Arc<UsageTracker>,
    usage_sink: Option<Arc<dyn UsageSink>>,
}

impl MentorService {
    /// Service with phrase-based trigger detection from `config`.
    pub fn new(
        config: &MentorConfig,
        processor: Arc<dyn SessionProcessor>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        let detector = Arc::new(PhraseTrigger::new(&config.trigger_phrases));
        Self::with_detector(config, detector, processor, usage)
    }

    pub fn with_detector(
        config: &MentorConfig,
        detector: Arc<dyn TriggerDetector>,
        processor: Arc<dyn SessionProcessor>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        let buffer = Arc::new(SegmentBuffer::new(detector, config.max_segments));
        let scheduler = IdleScheduler::new(
            Arc::clone(&buffer),
            processor,
            SchedulerConfig::from(config),
        );
        Self {
            buffer,
            scheduler,
            usage,
            usage_sink: None,
        }
    }

    /// Where buffered LLM usage goes at shutdown.
    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage_sink = Some(sink);
        self
    }

    /// Append live segments. Bound and immediate hits wake the scheduler.
    pub fn ingest(&self, session_id: &str, uid: &str, segments: &[TranscriptSegment]) -> AppendOutcome {
        let outcome = self.buffer.append(session_id, uid, segments);
        debug!(session_id, uid, ?outcome, "segments ingested");
        if matches!(outcome, AppendOutcome::ReadyByBound | AppendOutcome::TestReady) {
            self.scheduler.wake();
        }
        outcome
    }

    pub fn set_immediate(&self, session_id: &str, uid: &str, immediate: bool) {
        self.buffer.set_immediate(session_id, uid, immediate);
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.buffer.snapshot(session_id)
    }

    pub fn buffer(&self) -> &Arc<SegmentBuffer> {
        &self.buffer
    }

    /// Spawn the scheduler loop.
    pub fn start(&self) -> JoinHandle<usize> {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    /// Stop the scheduler, wait for in-flight dispatches, then drain usage.
    pub async fn shutdown(&self, scheduler: JoinHandle<usize>) {
        self.scheduler.shutdown();
        match scheduler.await {
            Ok(dispatched) => info!(dispatched, "scheduler stopped"),
            Err(e) => warn!(error = %e, "scheduler task ended abnormally"),
        }

        let Some(sink) = &self.usage_sink else {
            return;
        };
        match self.usage.drain_into(sink.as_ref()).await {
            Ok(records) => info!(records, "usage buffer drained"),
            Err(e) => warn!(error = %e, "usage drain failed"),
        }
    }
}
