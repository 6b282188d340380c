//! Client configuration with environment overrides.

use std::{env, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::info;

use crate::retry::RetryPolicy;

pub const ENV_API_URL: &str = "REELREVIEW_API_URL";
pub const ENV_TIMEOUT_MS: &str = "REELREVIEW_TIMEOUT_MS";
pub const ENV_MAX_ATTEMPTS: &str = "REELREVIEW_MAX_ATTEMPTS";
pub const ENV_BACKOFF_MS: &str = "REELREVIEW_BACKOFF_MS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-attempt timeout. An elapsed timeout counts as "no response".
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            base_backoff: Duration::from_millis(1000),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            base_url: lookup(ENV_API_URL).unwrap_or_else(|| {
                info!("{ENV_API_URL} not set, using default: {}", defaults.base_url);
                defaults.base_url
            }),
            timeout: Duration::from_millis(try_load(
                &lookup,
                ENV_TIMEOUT_MS,
                defaults.timeout.as_millis() as u64,
            )?),
            max_attempts: try_load(&lookup, ENV_MAX_ATTEMPTS, defaults.max_attempts)?,
            base_backoff: Duration::from_millis(try_load(
                &lookup,
                ENV_BACKOFF_MS,
                defaults.base_backoff.as_millis() as u64,
            )?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_backoff)
    }
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        },
    }
}
