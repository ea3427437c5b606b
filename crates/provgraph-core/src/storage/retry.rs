// Bounded retry with exponential backoff and jitter for transient storage failures

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 100;
const DEFAULT_MAX_DELAY_MS: u64 = 2_000;

/// Retry budget for networked backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff ceiling before the given retry (1-based), without jitter.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Delay drawn uniformly from the upper half of the backoff ceiling.
    fn jittered_delay(&self, retry: u32) -> Duration {
        let ceiling = self.delay_for_retry(retry).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let floor = ceiling / 2;
        Duration::from_millis(rand::thread_rng().gen_range(floor..=ceiling))
    }

    /// Runs `op`, retrying only failures that report themselves as transient.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Result<T, StorageError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.jittered_delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient storage failure, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    debug!(operation, attempt, error = %err, "Storage operation failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(10), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_retry(64), Duration::from_millis(2_000));
    }

    #[test]
    fn test_jitter_stays_within_ceiling() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.jittered_delay(2);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let calls = Cell::new(0);
        let result = fast().run("put", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(StorageError::Transient("connection reset".into()))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_budget_is_bounded() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast().run("get", || {
            calls.set(calls.get() + 1);
            Err(StorageError::Transient("timeout".into()))
        });

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_rejections_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast().run("put", || {
            calls.set(calls.get() + 1);
            Err(StorageError::Rejected {
                status: 422,
                message: "bad manifest".into(),
            })
        });

        assert!(matches!(result, Err(StorageError::Rejected { status: 422, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, DEFAULT_BASE_DELAY_MS);
        assert_eq!(policy.max_delay_ms, DEFAULT_MAX_DELAY_MS);
    }
}
