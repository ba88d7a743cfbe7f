use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Error message from the failed attempt.
    pub error: String,
    /// When this attempt failed.
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u32, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of recording a failure in a [`RetryState`].
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt + 1`.
    Retry { attempt: u32, delay: Duration },
    Exhausted { history: Vec<RetryAttempt> },
}

/// Retry bookkeeping for one message.
///
/// Lives for the processing lifetime of a single message: created when the
/// message is fetched and dropped once it is ingested or dead-lettered. With
/// `max_attempts = m` a message is tried at most `m + 1` times.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    base_delay: Duration,
    history: Vec<RetryAttempt>,
}

impl RetryState {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base_delay,
            history: Vec::new(),
        }
    }

    /// Number of retries scheduled so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn history(&self) -> &[RetryAttempt] {
        &self.history
    }

    pub fn into_history(self) -> Vec<RetryAttempt> {
        self.history
    }

    /// Record a retryable failure and decide what happens next.
    pub fn record_failure(&mut self, error: &str) -> RetryDecision {
        self.history
            .push(RetryAttempt::new(self.attempt + 1, error));

        if self.attempt < self.max_attempts {
            let delay = calculate_backoff(self.attempt + 1, self.base_delay);
            self.attempt += 1;
            RetryDecision::Retry {
                attempt: self.attempt,
                delay,
            }
        } else {
            RetryDecision::Exhausted {
                history: std::mem::take(&mut self.history),
            }
        }
    }
}

/// Linear backoff: `base * attempt`.
pub fn calculate_backoff(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(attempt)
}
