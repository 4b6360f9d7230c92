//! Bounded retry with exponential backoff and jitter.
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can drive the policy
//! with a fake clock instead of real delays.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, TrackerError};

/// Something that can pause the current thread.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Retry budget for backend I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction in `[0, 1]` by which a delay may be randomly shortened.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TrackerError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(TrackerError::Configuration(format!(
                "retry.jitter must be within [0, 1], got {}",
                self.jitter
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(TrackerError::Configuration(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay after the `attempt`-th failure (1-based).
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay`, then scaled by
    /// `1 - jitter * unit` where `unit` is in `[0, 1)`.
    pub fn backoff_delay(&self, attempt: u32, unit: f64) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let raw = self.base_delay_ms.saturating_mul(1u64 << exp);
        let capped = raw.min(self.max_delay_ms) as f64;
        let scale = 1.0 - self.jitter * unit.clamp(0.0, 1.0);
        Duration::from_millis((capped * scale).round() as u64)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. Exhaustion surfaces as `BackendUnavailable`.
    pub fn run<T, F>(&self, what: &str, sleeper: &dyn Sleeper, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff_delay(attempt, rand::thread_rng().gen::<f64>());
                    warn!(
                        operation = what,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    sleeper.sleep(delay);
                }
                Err(e) if e.is_transient() => {
                    return Err(TrackerError::BackendUnavailable(format!(
                        "{} failed after {} attempts: {}",
                        what, attempt, e
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
