//! Bounded retry with exponential backoff, shared by every network caller.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base, 2×base, 4×base, … capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts
    /// run out. `op` receives the 1-based attempt number. The last error is
    /// returned on failure.
    pub fn run<T, E, F, P>(&self, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => {
                    tracing::warn!(attempt, "non-retryable failure: {err}");
                    return Err(err);
                }
                Err(err) if attempt >= self.max_attempts => {
                    tracing::warn!(attempt, "giving up after {attempt} attempts: {err}");
                    return Err(err);
                }
                Err(err) => {
                    let wait = self.backoff(attempt);
                    tracing::info!(attempt, wait_ms = wait.as_millis() as u64, "retrying after: {err}");
                    std::thread::sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}
