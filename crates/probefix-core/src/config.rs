//! probefix.toml configuration parser.
//!
//! The config is read once at start-up and handed to the delivery layer
//! by value; nothing mutates it afterwards.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Interval between timer-triggered passes, e.g. "30s".
    pub timer_interval: String,
    /// Maximum number of passes running at once across all objects.
    pub workers: usize,
    /// Component name attached to emitted events.
    pub reporter: String,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per trigger, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: String,
    pub max_backoff: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            timer_interval: "30s".to_string(),
            workers: 4,
            reporter: "probe-fix".to_string(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: "1s".to_string(),
            max_backoff: "60s".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl ControllerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_toml_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file without validating it, for callers
    /// that apply overrides before calling [`validate`](Self::validate).
    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml_str(&content)
    }

    pub fn parse_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Check value ranges and that every duration string parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timer_interval()?.is_zero() {
            return Err(ConfigError::Invalid("timer_interval must be non-zero".to_string()));
        }
        if self.retry.initial_backoff()? > self.retry.max_backoff()? {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff exceeds retry.max_backoff".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timer_interval(&self) -> Result<Duration, ConfigError> {
        duration_field("timer_interval", &self.timer_interval)
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Result<Duration, ConfigError> {
        duration_field("retry.initial_backoff", &self.initial_backoff)
    }

    pub fn max_backoff(&self) -> Result<Duration, ConfigError> {
        duration_field("retry.max_backoff", &self.max_backoff)
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
