//! Per-session segment buffer with trigger detection and dispatch bounds.
//!
//! Each session moves `idle -> recording -> processing -> idle`. Ingestion
//! only appends and flips state; handing a session to the pipeline is the
//! idle scheduler's job (see [`SegmentBuffer::take_ready`]).
//!
//! The table is a read-mostly map of per-session locks. No lock is ever
//! held across an await.

pub mod trigger;

pub use trigger::{PhraseTrigger, TriggerDetector};

use crate::model::TranscriptSegment;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    Recording,
    Processing,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Processing => "processing",
        }
    }
}

/// What an append did to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// No trigger seen yet.
    Listening,
    /// Recording, with this many segments accumulated.
    Collecting(usize),
    /// The segment bound was hit; the session awaits dispatch.
    ReadyByBound,
    /// A dispatch is already in flight; the append was ignored.
    Processing,
    /// Immediate-process session triggered; awaits dispatch.
    TestReady,
}

/// Why a session was handed to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTrigger {
    Idle,
    Bound,
    Immediate,
}

impl DispatchTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Bound => "bound",
            Self::Immediate => "immediate",
        }
    }
}

/// A session captured at its `recording -> processing` transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingJob {
    pub session_id: String,
    pub uid: String,
    pub trigger: DispatchTrigger,
    /// Payload text accumulated since the trigger phrase.
    pub accumulated_text: String,
    /// Every segment received since the trigger, trigger segment included.
    pub messages: Vec<TranscriptSegment>,
}

/// Read-only view of a session, for inspection and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub uid: String,
    pub mode: SessionMode,
    pub accumulated_text: String,
    pub segments_count: usize,
    pub dispatch_pending: bool,
}

struct Session {
    uid: String,
    mode: SessionMode,
    accumulated_text: String,
    segments_count: usize,
    messages: Vec<TranscriptSegment>,
    last_activity: Instant,
    last_seen: Instant,
    pending: Option<DispatchTrigger>,
    immediate: bool,
}

impl Session {
    fn new(uid: &str) -> Self {
        let now = Instant::now();
        Self {
            uid: uid.to_string(),
            mode: SessionMode::Idle,
            accumulated_text: String::new(),
            segments_count: 0,
            messages: Vec::new(),
            last_activity: now,
            last_seen: now,
            pending: None,
            immediate: false,
        }
    }

    fn clear(&mut self) {
        self.mode = SessionMode::Idle;
        self.accumulated_text.clear();
        self.segments_count = 0;
        self.messages.clear();
        self.pending = None;
    }

    fn mark_ready(&mut self, trigger: DispatchTrigger) {
        self.mode = SessionMode::Processing;
        self.pending = Some(trigger);
    }

    fn job(&self, session_id: &str, trigger: DispatchTrigger) -> ProcessingJob {
        ProcessingJob {
            session_id: session_id.to_string(),
            uid: self.uid.clone(),
            trigger,
            accumulated_text: self.accumulated_text.clone(),
            messages: self.messages.clone(),
        }
    }
}

pub struct SegmentBuffer {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    detector: Arc<dyn TriggerDetector>,
    max_segments: usize,
}

impl SegmentBuffer {
    pub fn new(detector: Arc<dyn TriggerDetector>, max_segments: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            detector,
            max_segments: max_segments.max(1),
        }
    }

    fn session(&self, session_id: &str, uid: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().get(session_id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(uid)))),
        )
    }

    fn existing(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().get(session_id).map(Arc::clone)
    }

    /// Run `f` on the session registered under `session_id`, creating it
    /// if needed.
    fn with_session<R>(&self, session_id: &str, uid: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        self.with_current(session_id, uid, self.session(session_id, uid), f)
    }

    /// Lock `candidate` and run `f` on it if it is still the table's entry.
    /// Pruning can drop an entry between lookup and lock; the retry then
    /// works on the replacement so no write lands on an orphan.
    fn with_current<R>(
        &self,
        session_id: &str,
        uid: &str,
        mut candidate: Arc<Mutex<Session>>,
        f: impl FnOnce(&mut Session) -> R,
    ) -> R {
        loop {
            {
                let mut s = candidate.lock();
                if self.is_current(session_id, &candidate) {
                    return f(&mut s);
                }
            }
            candidate = self.session(session_id, uid);
        }
    }

    fn is_current(&self, session_id: &str, session: &Arc<Mutex<Session>>) -> bool {
        self.sessions
            .read()
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    /// Append transcript segments to a session, creating it on first use.
    pub fn append(
        &self,
        session_id: &str,
        uid: &str,
        segments: &[TranscriptSegment],
    ) -> AppendOutcome {
        self.with_session(session_id, uid, |s| self.append_locked(session_id, s, segments))
    }

    fn append_locked(
        &self,
        session_id: &str,
        s: &mut Session,
        segments: &[TranscriptSegment],
    ) -> AppendOutcome {
        if s.mode == SessionMode::Processing {
            return AppendOutcome::Processing;
        }

        let now = Instant::now();
        s.last_seen = now;
        let text = join_text(segments);

        if s.mode == SessionMode::Idle {
            let Some(payload) = self.detector.detect(&text) else {
                return AppendOutcome::Listening;
            };
            debug!(session_id, uid = %s.uid, "trigger detected");
            s.mode = SessionMode::Recording;
            s.accumulated_text = payload;
            s.segments_count = 1;
            s.messages = segments.to_vec();
        } else {
            if segments.is_empty() {
                return AppendOutcome::Collecting(s.segments_count);
            }
            if !text.is_empty() {
                if !s.accumulated_text.is_empty() {
                    s.accumulated_text.push(' ');
                }
                s.accumulated_text.push_str(&text);
            }
            s.segments_count += segments.len();
            s.messages.extend_from_slice(segments);
        }
        s.last_activity = now;

        if s.immediate {
            s.mark_ready(DispatchTrigger::Immediate);
            AppendOutcome::TestReady
        } else if s.segments_count >= self.max_segments {
            s.mark_ready(DispatchTrigger::Bound);
            AppendOutcome::ReadyByBound
        } else {
            AppendOutcome::Collecting(s.segments_count)
        }
    }

    /// Return a session to `idle` with an empty buffer.
    pub fn reset(&self, session_id: &str) {
        if let Some(session) = self.existing(session_id) {
            session.lock().clear();
        }
    }

    /// Mark a session to dispatch on its next triggered append, without
    /// waiting for the bound or the idle timeout.
    pub fn set_immediate(&self, session_id: &str, uid: &str, immediate: bool) {
        self.with_session(session_id, uid, |s| s.immediate = immediate);
    }

    /// Collect every session due for dispatch and move it to `processing`.
    ///
    /// Due means: flagged by the bound or immediate path, or recording with
    /// no new segment for at least `idle_timeout`. Each session is returned
    /// at most once per dispatch cycle.
    pub fn take_ready(&self, idle_timeout: Duration) -> Vec<ProcessingJob> {
        let now = Instant::now();
        let sessions: Vec<(String, Arc<Mutex<Session>>)> = self
            .sessions
            .read()
            .iter()
            .map(|(id, s)| (id.clone(), Arc::clone(s)))
            .collect();

        let mut jobs = Vec::new();
        for (session_id, session) in sessions {
            let mut s = session.lock();
            match s.mode {
                SessionMode::Processing => {
                    if let Some(trigger) = s.pending.take() {
                        jobs.push(s.job(&session_id, trigger));
                    }
                }
                SessionMode::Recording
                    if now.saturating_duration_since(s.last_activity) >= idle_timeout =>
                {
                    s.mode = SessionMode::Processing;
                    jobs.push(s.job(&session_id, DispatchTrigger::Idle));
                }
                _ => {}
            }
        }
        jobs
    }

    /// Drop idle sessions not seen for `max_age`. Returns how many went.
    pub fn prune_idle(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| {
            // A session locked elsewhere is in use.
            let Some(s) = session.try_lock() else {
                return true;
            };
            s.mode != SessionMode::Idle
                || s.immediate
                || now.saturating_duration_since(s.last_seen) < max_age
        });
        before - sessions.len()
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.existing(session_id).map(|session| {
            let s = session.lock();
            SessionSnapshot {
                uid: s.uid.clone(),
                mode: s.mode,
                accumulated_text: s.accumulated_text.clone(),
                segments_count: s.segments_count,
                dispatch_pending: s.pending.is_some(),
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn join_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(max_segments: usize) -> SegmentBuffer {
        SegmentBuffer::new(
            Arc::new(PhraseTrigger::new(["send slack message", "post in slack"])),
            max_segments,
        )
    }

    fn seg(text: &str) -> Vec<TranscriptSegment> {
        vec![TranscriptSegment::user(text)]
    }

    #[tokio::test(start_paused = true)]
    async fn listens_until_trigger() {
        let buf = buffer(5);
        assert_eq!(buf.append("s", "u", &seg("hello there")), AppendOutcome::Listening);
        let snap = buf.snapshot("s").unwrap();
        assert_eq!(snap.mode, SessionMode::Idle);
        assert_eq!(snap.segments_count, 0);

        assert_eq!(
            buf.append("s", "u", &seg("send slack message to team good morning")),
            AppendOutcome::Collecting(1)
        );
        let snap = buf.snapshot("s").unwrap();
        assert_eq!(snap.mode, SessionMode::Recording);
        assert_eq!(snap.accumulated_text, "to team good morning");
    }

    #[tokio::test(start_paused = true)]
    async fn bound_hit_moves_to_processing() {
        let buf = buffer(3);
        buf.append("s", "u", &seg("post in slack hi"));
        assert_eq!(buf.append("s", "u", &seg("two")), AppendOutcome::Collecting(2));
        assert_eq!(buf.append("s", "u", &seg("three")), AppendOutcome::ReadyByBound);

        let snap = buf.snapshot("s").unwrap();
        assert_eq!(snap.mode, SessionMode::Processing);
        assert_eq!(snap.accumulated_text, "hi two three");
        assert!(snap.dispatch_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn processing_ignores_appends() {
        let buf = buffer(1);
        assert_eq!(buf.append("s", "u", &seg("post in slack x")), AppendOutcome::ReadyByBound);
        let before = buf.snapshot("s").unwrap();
        assert_eq!(buf.append("s", "u", &seg("more words")), AppendOutcome::Processing);
        assert_eq!(buf.snapshot("s").unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_buffer() {
        let buf = buffer(5);
        buf.append("s", "u", &seg("post in slack something"));
        buf.append("s", "u", &seg("else"));
        buf.reset("s");
        let snap = buf.snapshot("s").unwrap();
        assert_eq!(snap.mode, SessionMode::Idle);
        assert_eq!(snap.segments_count, 0);
        assert_eq!(snap.accumulated_text, "");
        assert!(!snap.dispatch_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn take_ready_picks_idle_and_pending_once() {
        let buf = buffer(2);
        buf.append("idle", "u1", &seg("post in slack alone"));
        buf.append("bound", "u2", &seg("post in slack a"));
        buf.append("bound", "u2", &seg("b"));

        let jobs = buf.take_ready(Duration::from_secs(5));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].session_id, "bound");
        assert_eq!(jobs[0].trigger, DispatchTrigger::Bound);

        tokio::time::advance(Duration::from_secs(5)).await;
        let jobs = buf.take_ready(Duration::from_secs(5));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].session_id, "idle");
        assert_eq!(jobs[0].trigger, DispatchTrigger::Idle);
        assert_eq!(jobs[0].accumulated_text, "alone");

        assert!(buf.take_ready(Duration::from_secs(5)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_sessions_are_test_ready() {
        let buf = buffer(5);
        buf.set_immediate("t", "u", true);
        assert_eq!(buf.append("t", "u", &seg("nothing yet")), AppendOutcome::Listening);
        assert_eq!(buf.append("t", "u", &seg("post in slack now")), AppendOutcome::TestReady);
        let jobs = buf.take_ready(Duration::from_secs(5));
        assert_eq!(jobs[0].trigger, DispatchTrigger::Immediate);
    }

    #[tokio::test(start_paused = true)]
    async fn prunes_stale_idle_sessions_only() {
        let buf = buffer(5);
        buf.append("quiet", "u1", &seg("hello"));
        buf.append("busy", "u2", &seg("post in slack hi"));
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(buf.prune_idle(Duration::from_secs(30)), 1);
        assert!(buf.snapshot("quiet").is_none());
        assert!(buf.snapshot("busy").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn write_through_pruned_handle_lands_in_live_table() {
        let buf = buffer(5);
        let stale = buf.session("s", "u");
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        assert_eq!(buf.prune_idle(Duration::from_secs(30 * 60)), 1);
        assert_eq!(buf.len(), 0);

        buf.with_current("s", "u", stale, |s| {
            s.mode = SessionMode::Recording;
            s.accumulated_text = "late words".to_string();
            s.segments_count = 1;
            s.last_activity = Instant::now();
        });
        assert_eq!(buf.len(), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        let jobs = buf.take_ready(Duration::from_secs(5));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].accumulated_text, "late words");
    }
}
