//! Controller configuration.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `QUOTESYNC_API_URL` | `api_base_url` | `https://api.polygon.io` |
//! | `QUOTESYNC_REQUEST_TIMEOUT_MS` | `request_timeout` | 10 s |
//! | `QUOTESYNC_CREDENTIAL_RETRY_SECS` | `credential_retry` | 5 min |
//! | `QUOTESYNC_WORKERS` | `workers` | 4 |

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::DEFAULT_POLYGON_BASE_URL;
use crate::backoff::Backoff;
use crate::controller::DEFAULT_WORKERS;
use crate::reconciler::ReconcilerConfig;

pub const ENV_API_URL: &str = "QUOTESYNC_API_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "QUOTESYNC_REQUEST_TIMEOUT_MS";
pub const ENV_CREDENTIAL_RETRY_SECS: &str = "QUOTESYNC_CREDENTIAL_RETRY_SECS";
pub const ENV_WORKERS: &str = "QUOTESYNC_WORKERS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{variable} must be a positive integer, got '{value}'")]
    InvalidNumber {
        variable: &'static str,
        value: String,
    },

    #[error("{variable} must be an http(s) URL, got '{value}'")]
    InvalidUrl {
        variable: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub credential_retry: Duration,
    pub workers: usize,
    pub error_backoff: Backoff,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::from(DEFAULT_POLYGON_BASE_URL),
            request_timeout: Duration::from_secs(10),
            credential_retry: ReconcilerConfig::default().credential_retry,
            workers: DEFAULT_WORKERS,
            error_backoff: Backoff::default(),
        }
    }
}

impl ControllerConfig {
    /// Defaults overridden by `QUOTESYNC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = non_empty(lookup(ENV_API_URL)) {
            config.api_base_url = parse_url(ENV_API_URL, url)?;
        }
        if let Some(value) = non_empty(lookup(ENV_REQUEST_TIMEOUT_MS)) {
            config.request_timeout =
                Duration::from_millis(parse_positive(ENV_REQUEST_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = non_empty(lookup(ENV_CREDENTIAL_RETRY_SECS)) {
            config.credential_retry =
                Duration::from_secs(parse_positive(ENV_CREDENTIAL_RETRY_SECS, &value)?);
        }
        if let Some(value) = non_empty(lookup(ENV_WORKERS)) {
            let workers = parse_positive(ENV_WORKERS, &value)?;
            config.workers = usize::try_from(workers).map_err(|_| ConfigError::InvalidNumber {
                variable: ENV_WORKERS,
                value,
            })?;
        }

        Ok(config)
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Result<Self, ConfigError> {
        self.api_base_url = parse_url(ENV_API_URL, url.into())?;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            credential_retry: self.credential_retry,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_positive(variable: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .ok()
        .filter(|parsed| *parsed > 0)
        .ok_or_else(|| ConfigError::InvalidNumber {
            variable,
            value: value.to_owned(),
        })
}

fn parse_url(variable: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.trim_end_matches('/').to_owned())
    } else {
        Err(ConfigError::InvalidUrl { variable, value })
    }
}
