//! Configuration loading and representation.

use std::net::SocketAddr;
use std::time::Duration;

use jobforge_observability::LogFormat;

use crate::jobs::RetryPolicy;

pub const ENV_BIND_ADDR: &str = "JOBFORGE_BIND_ADDR";
pub const ENV_WORKERS: &str = "JOBFORGE_WORKERS";
pub const ENV_BACKOFF_BASE_MS: &str = "JOBFORGE_BACKOFF_BASE_MS";
pub const ENV_BACKOFF_MAX_MS: &str = "JOBFORGE_BACKOFF_MAX_MS";
pub const ENV_LOG_FORMAT: &str = "JOBFORGE_LOG_FORMAT";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Process configuration, read from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Number of worker loops; at least 1.
    pub workers: usize,
    pub retry: RetryPolicy,
    pub log_format: LogFormat,
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            workers: 1,
            retry: RetryPolicy::default(),
            log_format: LogFormat::default(),
            database_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup. Unset or blank keys
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(ENV_BIND_ADDR) {
            config.bind_addr = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_BIND_ADDR, format!("{raw:?}: {e}")))?;
        }

        if let Some(raw) = get(ENV_WORKERS) {
            let workers: usize = parse_number(ENV_WORKERS, &raw)?;
            if workers == 0 {
                return Err(ConfigError::invalid(ENV_WORKERS, "must be at least 1"));
            }
            config.workers = workers;
        }

        if let Some(raw) = get(ENV_BACKOFF_BASE_MS) {
            config.retry.base_delay = Duration::from_millis(parse_number(ENV_BACKOFF_BASE_MS, &raw)?);
        }
        if let Some(raw) = get(ENV_BACKOFF_MAX_MS) {
            config.retry.max_delay = Duration::from_millis(parse_number(ENV_BACKOFF_MAX_MS, &raw)?);
        }
        if config.retry.max_delay < config.retry.base_delay {
            return Err(ConfigError::invalid(
                ENV_BACKOFF_MAX_MS,
                "must not be smaller than the base delay",
            ));
        }

        if let Some(raw) = get(ENV_LOG_FORMAT) {
            config.log_format = raw
                .parse()
                .map_err(|e: String| ConfigError::invalid(ENV_LOG_FORMAT, e))?;
        }

        config.database_url = get(ENV_DATABASE_URL);
        Ok(config)
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::invalid(key, format!("{raw:?}: {e}")))
}
