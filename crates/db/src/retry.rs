use std::thread;
use std::time::{Duration, Instant};

use crate::error::{DbError, Result};

/// Backoff and deadline settings applied to every storage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Absolute bound for one call including all retries.
    pub timeout: Duration,
    /// How long SQLite itself waits on a lock before reporting busy.
    pub busy_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(320),
            timeout: Duration::from_secs(3),
            busy_timeout: Duration::from_millis(50),
        }
    }
}

/// Runs `op`, retrying only contention errors with exponential backoff.
///
/// Any other error is returned on the first failure. Once the policy's
/// deadline has passed, a contention failure becomes [`DbError::Timeout`].
pub fn with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match op() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_contention() => return Err(err),
            Err(err) => err,
        };
        if attempt >= max_attempts {
            tracing::warn!(attempt, error = %err, "storage contention, giving up");
            return Err(err);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(DbError::Timeout {
                attempts: attempt,
                elapsed: started.elapsed(),
            });
        }
        let pause = delay.min(deadline - now);
        tracing::debug!(
            attempt,
            delay_ms = pause.as_millis() as u64,
            "storage busy, retrying"
        );
        thread::sleep(pause);
        delay = delay.saturating_mul(2).min(policy.max_delay);
    }
}
