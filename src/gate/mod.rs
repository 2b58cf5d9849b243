//! Rate-limit and daily-cap gate for outgoing notifications.
//!
//! Three tiers, checked in order:
//! 1. local: in-process map of `(uid, capability)` to the instant its window ends
//! 2. remote: shared KV entry holding the last send time, TTL = window
//! 3. daily: shared per-user counter keyed by UTC date
//!
//! The remote tier is authoritative across instances. When it denies with
//! a known TTL, the local tier is refreshed so the next check short-circuits.

use crate::config::MentorConfig;
use crate::kv::KvStore;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A named notification channel with its own rate-limit window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    pub name: String,
    pub window: Duration,
}

impl Capability {
    pub fn new(name: impl Into<String>, window: Duration) -> Self {
        Self {
            name: name.into(),
            window,
        }
    }

    /// The mentor channel as configured.
    pub fn mentor(config: &MentorConfig) -> Self {
        Self::new(config.capability.clone(), config.mentor_window)
    }

    /// General proactive notifications from apps.
    pub fn proactive(config: &MentorConfig) -> Self {
        Self::new("proactive_notification", config.proactive_window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    LocalRateLimited,
    RemoteRateLimited,
    DailyCapReached,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalRateLimited => "local_rate_limited",
            Self::RemoteRateLimited => "remote_rate_limited",
            Self::DailyCapReached => "daily_cap_reached",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Key of the shared last-sent entry.
pub fn remote_key(uid: &str, capability: &str) -> String {
    format!("proactive_noti_sent_at:{uid}:{capability}")
}

/// Key of the shared daily counter.
pub fn daily_key(uid: &str, date: NaiveDate) -> String {
    format!("daily_noti_count:{uid}:{}", date.format("%Y-%m-%d"))
}

pub struct RateGate {
    local: Mutex<HashMap<(String, String), Instant>>,
    remote: Arc<dyn KvStore>,
    daily_max: u64,
}

impl RateGate {
    pub fn new(remote: Arc<dyn KvStore>, daily_max: u64) -> Self {
        Self {
            local: Mutex::new(HashMap::new()),
            remote,
            daily_max,
        }
    }

    /// Decide whether `uid` may receive a notification on `capability` now.
    ///
    /// Remote read failures fall through to the next tier.
    pub async fn check(&self, uid: &str, capability: &Capability) -> Decision {
        if self.locally_blocked(uid, &capability.name) {
            return Decision::Deny(DenyReason::LocalRateLimited);
        }

        if self.remotely_blocked(uid, capability).await {
            return Decision::Deny(DenyReason::RemoteRateLimited);
        }

        match self.daily_count(uid).await {
            Ok(count) if count >= self.daily_max => {
                return Decision::Deny(DenyReason::DailyCapReached);
            }
            Ok(_) => {}
            Err(e) => warn!(uid, error = %e, "daily cap read failed, allowing"),
        }

        Decision::Allow
    }

    /// Note a successful dispatch in all three tiers.
    ///
    /// Writes are best-effort: failures are logged and do not undo the
    /// dispatch.
    pub async fn record(&self, uid: &str, capability: &Capability) {
        self.local.lock().insert(
            (uid.to_string(), capability.name.clone()),
            Instant::now() + capability.window,
        );

        let sent_at = Utc::now().timestamp().to_string();
        if let Err(e) = self
            .remote
            .setex(
                &remote_key(uid, &capability.name),
                capability.window,
                sent_at.as_bytes(),
            )
            .await
        {
            warn!(uid, capability = %capability.name, error = %e, "remote rate-limit write failed");
        }

        let key = daily_key(uid, Utc::now().date_naive());
        match self.remote.incr(&key).await {
            Ok(count) => {
                debug!(uid, count, "daily notification count");
                if let Err(e) = self.remote.expire(&key, until_next_utc_day()).await {
                    warn!(uid, error = %e, "daily counter expiry write failed");
                }
            }
            Err(e) => warn!(uid, error = %e, "daily counter increment failed"),
        }
    }

    /// Today's dispatch count for `uid`.
    pub async fn daily_count(&self, uid: &str) -> crate::error::Result<u64> {
        let raw = self.remote.get(&daily_key(uid, Utc::now().date_naive())).await?;
        Ok(raw
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0))
    }

    fn locally_blocked(&self, uid: &str, capability: &str) -> bool {
        let now = Instant::now();
        let mut local = self.local.lock();
        let key = (uid.to_string(), capability.to_string());
        match local.get(&key) {
            Some(until) if now < *until => true,
            Some(_) => {
                local.remove(&key);
                false
            }
            None => false,
        }
    }

    async fn remotely_blocked(&self, uid: &str, capability: &Capability) -> bool {
        let key = remote_key(uid, &capability.name);
        let raw = match self.remote.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(uid, capability = %capability.name, error = %e, "remote rate-limit read failed");
                return false;
            }
        };

        // An unreadable timestamp still marks a live window.
        let within_window = std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .is_none_or(|sent_at| {
                let elapsed = Utc::now().timestamp().saturating_sub(sent_at);
                elapsed < capability.window.as_secs() as i64
            });
        if !within_window {
            return false;
        }

        match self.remote.ttl(&key).await {
            Ok(Some(ttl)) if !ttl.is_zero() => {
                self.local.lock().insert(
                    (uid.to_string(), capability.name.clone()),
                    Instant::now() + ttl,
                );
            }
            Ok(_) => {}
            Err(e) => warn!(uid, error = %e, "remote rate-limit ttl read failed"),
        }
        true
    }
}

fn until_next_utc_day() -> Duration {
    let now = Utc::now();
    let tomorrow = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    match tomorrow {
        Some(midnight) => (midnight - now)
            .to_std()
            .unwrap_or(Duration::from_secs(1))
            .max(Duration::from_secs(1)),
        None => Duration::from_secs(24 * 60 * 60),
    }
}
