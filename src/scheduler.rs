//! Idle scheduler: the single place sessions are handed to the pipeline.
//!
//! Each tick (and on every wake from ingestion) it moves due sessions to
//! `processing` via [`SegmentBuffer::take_ready`], then runs each job out
//! of band. Whatever the job does (success, error, panic) the session is
//! reset to `idle` afterwards.

use crate::config::MentorConfig;
use crate::error::Result;
use crate::session::{ProcessingJob, SegmentBuffer};
use crate::telemetry::metrics;
use crate::telemetry::pipeline::{record_mode_transition, start_process_span};
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{Instrument, debug, error, info, warn};

/// Consumes a session captured at its `recording -> processing` transition.
#[async_trait]
pub trait SessionProcessor: Send + Sync {
    async fn process(&self, job: ProcessingJob) -> Result<()>;
}

/// Timing for the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick: Duration,
    pub idle_timeout: Duration,
    /// Idle sessions unseen for this long are dropped from the table.
    pub session_ttl: Duration,
    /// Upper bound on waiting for in-flight jobs at shutdown.
    pub shutdown_grace: Duration,
}

impl From<&MentorConfig> for SchedulerConfig {
    fn from(config: &MentorConfig) -> Self {
        Self {
            tick: config.scheduler_tick,
            idle_timeout: config.idle_timeout,
            session_ttl: config.session_ttl,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

pub struct IdleScheduler {
    buffer: Arc<SegmentBuffer>,
    processor: Arc<dyn SessionProcessor>,
    config: SchedulerConfig,
    wake: Arc<Notify>,
    shutdown: Arc<Notify>,
}

impl Clone for IdleScheduler {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            processor: Arc::clone(&self.processor),
            config: self.config.clone(),
            wake: Arc::clone(&self.wake),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl IdleScheduler {
    pub fn new(
        buffer: Arc<SegmentBuffer>,
        processor: Arc<dyn SessionProcessor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            buffer,
            processor,
            config,
            wake: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Ask for a scan before the next tick.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Signal the loop to stop. In-flight jobs are drained by [`run`](Self::run).
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run until shutdown, then wait up to the grace period for in-flight
    /// jobs. Returns the number of jobs dispatched.
    pub async fn run(&self) -> usize {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();
        let mut dispatched = 0;

        info!(tick_ms = self.config.tick.as_millis() as u64, "idle scheduler started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = self.wake.notified() => {}
                _ = interval.tick() => {
                    let pruned = self.buffer.prune_idle(self.config.session_ttl);
                    if pruned > 0 {
                        debug!(pruned, "pruned idle sessions");
                    }
                }
            }

            while in_flight.try_join_next().is_some() {}

            for job in self.buffer.take_ready(self.config.idle_timeout) {
                dispatched += 1;
                in_flight.spawn(dispatch(
                    Arc::clone(&self.buffer),
                    Arc::clone(&self.processor),
                    job,
                ));
            }
        }

        info!(in_flight = in_flight.len(), "idle scheduler stopping");
        let drain = async { while in_flight.join_next().await.is_some() {} };
        if tokio::time::timeout(self.config.shutdown_grace, drain).await.is_err() {
            warn!(
                abandoned = in_flight.len(),
                "shutdown grace elapsed with jobs in flight"
            );
            in_flight.abort_all();
        }
        dispatched
    }
}

/// Aborts the processor task when the dispatch future is dropped, so
/// `abort_all` at the end of the shutdown grace reaches it too.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one job on its own task so a panic is contained, then reset.
async fn dispatch(buffer: Arc<SegmentBuffer>, processor: Arc<dyn SessionProcessor>, job: ProcessingJob) {
    let session_id = job.session_id.clone();
    let trigger = job.trigger;
    let span = start_process_span(&job.uid, &session_id, trigger.as_str());

    metrics::sessions_triggered().add(1, &[KeyValue::new("trigger", trigger.as_str())]);
    record_mode_transition(&span, "recording", "processing");

    let task = tokio::spawn(async move { processor.process(job).await }.instrument(span.clone()));
    let _cancel = AbortOnDrop(task.abort_handle());
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            span.in_scope(|| error!(%session_id, error = %e, "session processing failed"));
        }
        Err(e) => {
            span.in_scope(|| error!(%session_id, error = %e, "session processing panicked"));
        }
    }

    buffer.reset(&session_id);
    record_mode_transition(&span, "processing", "idle");
}
