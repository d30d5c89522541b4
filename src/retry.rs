//! Backoff calculation for providers that retry their own deliveries
//!
//! Attempt 1 goes out immediately; attempt `k` (k >= 2) waits
//! `base_delay * 2^(k-2)`, capped at `max_delay`.
//!
//! ## Worst-case latency
//!
//! A full retry sequence takes at most
//! `max_attempts * attempt_timeout + Σ delay_before(k)`. With the defaults
//! (3 attempts, 1s per attempt, 200ms base, 1s cap) that is
//! `3 * 1000 + 0 + 200 + 400 = 3600ms`, which fits inside the manager's
//! default 5s per-provider timeout.

use crate::error::{EventError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (must be >= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Timeout applied to each individual attempt, in milliseconds
    pub attempt_timeout_ms: u64,
    /// Randomize each delay within `[d/2, d]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 1000,
            attempt_timeout_ms: 1000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Per-attempt timeout as a `Duration`
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay without jitter before the given attempt (1-indexed)
    pub fn base_delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Delay to wait before the given attempt (1-indexed)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_before(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let ms = delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
    }

    /// Upper bound on the wall-clock time of a full retry sequence
    pub fn worst_case_latency(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let waits: Duration = (1..=attempts).map(|k| self.base_delay_before(k)).sum();
        self.attempt_timeout() * attempts + waits
    }

    /// Reject policies that cannot make progress
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(EventError::Config(
                "retry maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(EventError::Config(
                "retry attemptTimeoutMs must be greater than 0".to_string(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(EventError::Config(format!(
                "retry baseDelayMs ({}) exceeds maxDelayMs ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}
