//! Environment configuration

use crate::runtime::PollIntervals;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DIRECTORY_SECS: u64 = 10;
const DEFAULT_LOG_SECS: u64 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CHAT_CONSOLE_API_URL is not set")]
    MissingApiUrl,
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Console configuration, read from `CHAT_CONSOLE_*` variables
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub api_url: String,
    pub admin_token: Option<String>,
    pub directory_interval: Duration,
    pub log_interval: Duration,
    pub request_timeout: Duration,
}

impl ConsoleConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("CHAT_CONSOLE_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;

        let admin_token = lookup("CHAT_CONSOLE_ADMIN_TOKEN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let secs = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            let value = match lookup(key) {
                None => default,
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!(key, value = %raw, default, "Ignoring invalid number");
                    default
                }),
            };
            if value == 0 {
                return Err(ConfigError::ZeroInterval(key));
            }
            Ok(Duration::from_secs(value))
        };

        Ok(Self {
            api_url,
            admin_token,
            directory_interval: secs("CHAT_CONSOLE_DIRECTORY_INTERVAL_SECS", DEFAULT_DIRECTORY_SECS)?,
            log_interval: secs("CHAT_CONSOLE_LOG_INTERVAL_SECS", DEFAULT_LOG_SECS)?,
            request_timeout: secs("CHAT_CONSOLE_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
        })
    }

    pub fn poll_intervals(&self) -> PollIntervals {
        PollIntervals {
            directory: self.directory_interval,
            log: self.log_interval,
        }
    }
}
