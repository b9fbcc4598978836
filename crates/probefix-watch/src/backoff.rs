//! Retry policy for failed passes.
//!
//! Retryable failures (transient errors, conflicts) are retried with
//! exponential backoff. Everything else ends the trigger after the first
//! attempt.

use std::time::Duration;

use tracing::debug;

use probefix_core::{ConfigError, RetryConfig};

/// Immutable retry settings shared by all passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff()?,
            max_backoff: config.max_backoff()?,
        })
    }

    pub fn tracker(&self) -> RetryTracker {
        RetryTracker::new(*self)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Tracks consecutive failures for one trigger.
#[derive(Debug)]
pub struct RetryTracker {
    policy: RetryPolicy,
    /// Attempts made so far.
    attempts: u32,
    /// Delay before the next attempt.
    current_backoff: Duration,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            current_backoff: policy.initial_backoff,
        }
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay to wait before retrying, or `None` when the
    /// attempt budget is spent.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            debug!(attempts = self.attempts, "retry budget exhausted");
            return None;
        }

        let delay = self.current_backoff;
        // Exponential backoff: double the interval up to max.
        self.current_backoff = self
            .current_backoff
            .checked_mul(2)
            .unwrap_or(self.policy.max_backoff)
            .min(self.policy.max_backoff);
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
