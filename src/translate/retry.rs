//! Bounded exponential-backoff retry around a single transport attempt.
//! Only `TranslateError::Transient` is retried: 3 attempts in total,
//! waiting 1s before the second and 2s before the third.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::TranslateError;

pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RETRY_ATTEMPTS, RETRY_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay awaited before attempt `attempt` (1-based). No delay before the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX))
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, TranslateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TranslateError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    warn!(attempts = attempt, error = %err, "retries exhausted");
                    return Err(TranslateError::RetriesExhausted {
                        attempts: attempt,
                        last_error: transient_reason(err),
                    });
                }
                Err(err) => {
                    attempt += 1;
                    let wait = self.delay_before(attempt);
                    warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

fn transient_reason(err: TranslateError) -> String {
    match err {
        TranslateError::Transient(reason) => reason,
        other => other.to_string(),
    }
}
