//! Typed configuration from environment variables and an optional TOML file.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod mentor;

pub use mentor::MentorConfig;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub anthropic_api_key: SecretString,
    /// Embeddings provider key. Without it the vector index is disabled
    /// and every semantic lookup degrades to the scoring path.
    pub openai_api_key: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub mentor_config_path: Option<PathBuf>,
    pub db_max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            anthropic_api_key: SecretString::from(required_var("ANTHROPIC_API_KEY")?),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().map(SecretString::from),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            mentor_config_path: std::env::var("MENTOR_CONFIG").ok().map(PathBuf::from),
            db_max_connections: match std::env::var("DATABASE_MAX_CONNECTIONS") {
                Ok(raw) => raw.trim().parse().map_err(|_| {
                    Error::Config(format!("DATABASE_MAX_CONNECTIONS must be a number, got '{raw}'"))
                })?,
                Err(_) => crate::db::DEFAULT_MAX_CONNECTIONS,
            },
        })
    }

    /// Build the pipeline tunables: TOML file first (if configured), then
    /// `MENTOR_*` environment overrides.
    pub fn mentor(&self) -> Result<MentorConfig> {
        let base = match &self.mentor_config_path {
            Some(path) => MentorConfig::load(path)?,
            None => MentorConfig::default(),
        };
        base.with_env_overrides()
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
