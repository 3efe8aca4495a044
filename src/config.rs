//! Application configuration loaded from the environment
//!
//! All configuration is read once at startup and passed by value into the
//! services. Invalid configuration (missing required key, out-of-range
//! numeric, unknown backend) fails fast with a message naming the offending
//! variable.

use std::path::PathBuf;
use std::time::Duration;

/// Default reporting window in days.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;
/// Default bound on validation retries per report run.
pub const DEFAULT_VALIDATION_MAX_ATTEMPTS: u32 = 2;
/// Default chat-completions endpoint.
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
/// Default model identifier for the OpenAI backend.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default sampling temperature.
pub const DEFAULT_OPENAI_TEMPERATURE: f32 = 0.3;
/// Default completion token budget.
pub const DEFAULT_OPENAI_MAX_TOKENS: u32 = 2048;
/// Default LLM request timeout in seconds.
pub const DEFAULT_OPENAI_TIMEOUT_SECS: u64 = 120;
/// Default staleness threshold for ingestion, in hours.
pub const DEFAULT_INGESTION_STALE_AFTER_HOURS: i64 = 24;

/// Configuration errors surfaced at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("unknown status model backend {0:?} (expected \"mock\" or \"openai\")")]
    UnknownBackend(String),
}

/// Which status model variant to construct at startup
#[derive(Debug, Clone)]
pub enum StatusModelBackend {
    /// Deterministic heuristic, no network access.
    Mock,
    /// OpenAI-compatible chat-completions endpoint.
    OpenAi(OpenAiSettings),
}

/// Settings for the OpenAI-compatible backend
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Immutable application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_pool_size: u32,
    pub reporting_window_days: i64,
    pub report_sink_path: Option<PathBuf>,
    pub status_model: StatusModelBackend,
    pub validation_max_attempts: u32,
    pub ingestion_stale_after_hours: i64,
    pub http_host: String,
    pub http_port: u16,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// The indirection keeps validation testable without mutating process
    /// environment state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingVar("DATABASE_URL"))?;

        let database_pool_size = parse_or("DATABASE_POOL_SIZE", &lookup, 10u32)?;
        if database_pool_size == 0 {
            return Err(invalid("DATABASE_POOL_SIZE", "must be greater than zero"));
        }

        let reporting_window_days =
            parse_or("REPORTING_WINDOW_DAYS", &lookup, DEFAULT_WINDOW_DAYS)?;
        if reporting_window_days < 1 {
            return Err(invalid("REPORTING_WINDOW_DAYS", "must be at least 1"));
        }

        let validation_max_attempts = parse_or(
            "VALIDATION_MAX_ATTEMPTS",
            &lookup,
            DEFAULT_VALIDATION_MAX_ATTEMPTS,
        )?;
        if validation_max_attempts < 1 {
            return Err(invalid("VALIDATION_MAX_ATTEMPTS", "must be at least 1"));
        }

        let ingestion_stale_after_hours = parse_or(
            "INGESTION_STALE_AFTER_HOURS",
            &lookup,
            DEFAULT_INGESTION_STALE_AFTER_HOURS,
        )?;
        if ingestion_stale_after_hours < 1 {
            return Err(invalid("INGESTION_STALE_AFTER_HOURS", "must be at least 1"));
        }

        let report_sink_path = lookup("REPORT_SINK_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let backend = lookup("STATUS_MODEL_BACKEND").unwrap_or_else(|| "mock".to_string());
        let status_model = match backend.as_str() {
            "mock" => StatusModelBackend::Mock,
            "openai" => StatusModelBackend::OpenAi(openai_settings(&lookup)?),
            other => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        let http_host = lookup("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let http_port = parse_or("HTTP_PORT", &lookup, 8080u16)?;

        Ok(Self {
            database_url,
            database_pool_size,
            reporting_window_days,
            report_sink_path,
            status_model,
            validation_max_attempts,
            ingestion_stale_after_hours,
            http_host,
            http_port,
        })
    }
}

fn openai_settings<F>(lookup: &F) -> Result<OpenAiSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = lookup("OPENAI_API_KEY")
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;

    let endpoint = lookup("OPENAI_ENDPOINT").unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string());
    url::Url::parse(&endpoint).map_err(|e| invalid("OPENAI_ENDPOINT", e.to_string()))?;

    let model = lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());

    let temperature = parse_or("OPENAI_TEMPERATURE", lookup, DEFAULT_OPENAI_TEMPERATURE)?;
    if !(0.0..=2.0).contains(&temperature) {
        return Err(invalid("OPENAI_TEMPERATURE", "must be within [0.0, 2.0]"));
    }

    let max_tokens = parse_or("OPENAI_MAX_TOKENS", lookup, DEFAULT_OPENAI_MAX_TOKENS)?;
    if max_tokens == 0 {
        return Err(invalid("OPENAI_MAX_TOKENS", "must be greater than zero"));
    }

    let timeout_secs = parse_or("OPENAI_TIMEOUT_SECS", lookup, DEFAULT_OPENAI_TIMEOUT_SECS)?;
    if timeout_secs == 0 {
        return Err(invalid("OPENAI_TIMEOUT_SECS", "must be greater than zero"));
    }

    Ok(OpenAiSettings {
        api_key,
        endpoint,
        model,
        temperature,
        max_tokens,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| invalid(key, e.to_string())),
    }
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        message: message.into(),
    }
}
