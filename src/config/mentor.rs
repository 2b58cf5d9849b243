//! Pipeline tunables: segment bounds, windows, caps, thresholds.
//!
//! Every value has a default. A TOML file may override any subset, and
//! `MENTOR_*` environment variables override the file.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Tunables for the mentor pipeline and its gates.
#[derive(Debug, Clone)]
pub struct MentorConfig {
    /// Segments accumulated in `recording` before a dispatch is forced.
    pub max_segments: usize,
    /// Silence after which a recording session is dispatched.
    pub idle_timeout: Duration,
    /// How often the idle scheduler scans the session table.
    pub scheduler_tick: Duration,
    /// Untriggered sessions unseen for this long are dropped from the table.
    pub session_ttl: Duration,
    /// Rate-limit window for the mentor capability.
    pub mentor_window: Duration,
    /// Rate-limit window for general proactive notifications.
    pub proactive_window: Duration,
    /// Notifications allowed per user per UTC day.
    pub daily_max: u64,
    /// Minimum evaluator confidence per frequency level.
    pub frequency_thresholds: BTreeMap<u8, f64>,
    /// TTL of the `prompt_data:{uid}:{k}` cache entries.
    pub prompt_cache_ttl: Duration,
    /// Capability label used for rate-limit keys and notification history.
    pub capability: String,
    /// Sender name shown on dispatched notifications.
    pub app_name: String,
    /// Phrases that move a session from `idle` to `recording`.
    pub trigger_phrases: Vec<String>,
    /// Memory pack size for the evaluator context.
    pub memory_k: usize,
    pub reasoning_model: String,
    pub embedding_model: String,
    /// Upper bound on waiting for in-flight dispatches at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for MentorConfig {
    fn default() -> Self {
        Self {
            max_segments: 5,
            idle_timeout: Duration::from_secs(5),
            scheduler_tick: Duration::from_secs(1),
            session_ttl: Duration::from_secs(30 * 60),
            mentor_window: Duration::from_secs(300),
            proactive_window: Duration::from_secs(30),
            daily_max: 12,
            frequency_thresholds: default_thresholds(),
            prompt_cache_ttl: Duration::from_secs(300),
            capability: "mentor".to_string(),
            app_name: "Omi".to_string(),
            trigger_phrases: vec![
                "send slack message".to_string(),
                "post in slack".to_string(),
            ],
            memory_k: 50,
            reasoning_model: "claude-sonnet-4-20250514".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

fn default_thresholds() -> BTreeMap<u8, f64> {
    BTreeMap::from([(1, 0.80), (2, 0.70), (3, 0.60), (4, 0.50)])
}

/// On-disk shape. Every key is optional; each duration key names its unit.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    max_segments: Option<usize>,
    idle_timeout_secs: Option<u64>,
    scheduler_tick_ms: Option<u64>,
    session_ttl_secs: Option<u64>,
    mentor_window_secs: Option<u64>,
    proactive_window_secs: Option<u64>,
    daily_max: Option<u64>,
    frequency_thresholds: Option<BTreeMap<String, f64>>,
    prompt_cache_ttl_secs: Option<u64>,
    capability: Option<String>,
    app_name: Option<String>,
    trigger_phrases: Option<Vec<String>>,
    memory_k: Option<usize>,
    reasoning_model: Option<String>,
    embedding_model: Option<String>,
    shutdown_grace_secs: Option<u64>,
}

impl MentorConfig {
    /// Load from a TOML file, filling unspecified keys with defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read mentor config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bad mentor config {}: {e}", path.display())))
    }

    /// Parse TOML content over the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        let mut config = Self::default();

        if let Some(v) = file.max_segments {
            config.max_segments = v;
        }
        if let Some(v) = file.idle_timeout_secs {
            config.idle_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.scheduler_tick_ms {
            config.scheduler_tick = Duration::from_millis(v);
        }
        if let Some(v) = file.session_ttl_secs {
            config.session_ttl = Duration::from_secs(v);
        }
        if let Some(v) = file.mentor_window_secs {
            config.mentor_window = Duration::from_secs(v);
        }
        if let Some(v) = file.proactive_window_secs {
            config.proactive_window = Duration::from_secs(v);
        }
        if let Some(v) = file.daily_max {
            config.daily_max = v;
        }
        if let Some(map) = file.frequency_thresholds {
            config.frequency_thresholds = map
                .into_iter()
                .map(|(level, threshold)| Ok((parse_level(&level)?, threshold)))
                .collect::<Result<_>>()?;
        }
        if let Some(v) = file.prompt_cache_ttl_secs {
            config.prompt_cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = file.capability {
            config.capability = v;
        }
        if let Some(v) = file.app_name {
            config.app_name = v;
        }
        if let Some(v) = file.trigger_phrases {
            config.trigger_phrases = v;
        }
        if let Some(v) = file.memory_k {
            config.memory_k = v;
        }
        if let Some(v) = file.reasoning_model {
            config.reasoning_model = v;
        }
        if let Some(v) = file.embedding_model {
            config.embedding_model = v;
        }
        if let Some(v) = file.shutdown_grace_secs {
            config.shutdown_grace = Duration::from_secs(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply `MENTOR_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<usize>("MENTOR_MAX_SEGMENTS")? {
            self.max_segments = v;
        }
        if let Some(v) = env_parse::<u64>("MENTOR_IDLE_TIMEOUT_SECS")? {
            self.idle_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("MENTOR_WINDOW_SECS")? {
            self.mentor_window = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("MENTOR_PROACTIVE_WINDOW_SECS")? {
            self.proactive_window = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("MENTOR_DAILY_MAX")? {
            self.daily_max = v;
        }
        if let Ok(raw) = std::env::var("MENTOR_FREQUENCY_THRESHOLDS") {
            self.frequency_thresholds = parse_thresholds(&raw)?;
        }
        if let Some(v) = env_parse::<u64>("MENTOR_PROMPT_CACHE_TTL_SECS")? {
            self.prompt_cache_ttl = Duration::from_secs(v);
        }
        if let Ok(v) = std::env::var("MENTOR_CAPABILITY") {
            self.capability = v;
        }
        if let Ok(raw) = std::env::var("MENTOR_TRIGGER_PHRASES") {
            self.trigger_phrases = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        self.validate()?;
        Ok(self)
    }

    /// Confidence threshold for a frequency level, if the level is mapped.
    pub fn threshold_for(&self, frequency: u8) -> Option<f64> {
        self.frequency_thresholds.get(&frequency).copied()
    }

    fn validate(&self) -> Result<()> {
        if self.max_segments == 0 {
            return Err(Error::Config("max_segments must be at least 1".to_string()));
        }
        if self.scheduler_tick.is_zero() {
            return Err(Error::Config("scheduler tick must be non-zero".to_string()));
        }
        if self.frequency_thresholds.contains_key(&0) {
            return Err(Error::Config(
                "frequency 0 disables the mentor and cannot carry a threshold".to_string(),
            ));
        }
        if let Some((level, t)) = self
            .frequency_thresholds
            .iter()
            .find(|(_, t)| !(0.0..=1.0).contains(*t))
        {
            return Err(Error::Config(format!(
                "threshold {t} for frequency {level} is outside [0, 1]"
            )));
        }
        Ok(())
    }
}

/// Parse `"1:0.8,2:0.7"` into a frequency map.
pub fn parse_thresholds(raw: &str) -> Result<BTreeMap<u8, f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (level, threshold) = pair
                .split_once(':')
                .ok_or_else(|| Error::Config(format!("bad threshold entry '{pair}'")))?;
            let threshold: f64 = threshold
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("bad threshold value in '{pair}'")))?;
            Ok((parse_level(level)?, threshold))
        })
        .collect()
}

fn parse_level(raw: &str) -> Result<u8> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("bad frequency level '{raw}'")))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} has an invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}
