//! Exponential backoff for whole reconciliation passes.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{StrideError, StrideResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (0 = none).
    pub max_retries: u32,
    /// Base delay for the exponential backoff.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &StrideError) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// `min(base * 2^attempt, max)`, or the server's `Retry-After` when rate limited.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &StrideError) -> Duration {
        if let StrideError::RateLimited {
            retry_after_secs: Some(secs),
        } = error
        {
            return Duration::from_secs(*secs).min(self.max_delay);
        }
        self.backoff(attempt)
    }

    /// `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Final error once `error` ends a retry loop after `attempts` tries.
    /// A transient error that used up a non-empty budget becomes
    /// `MaxRetriesExceeded`; anything else comes back as is.
    pub(crate) fn exhausted(&self, operation_name: &str, attempts: u32, error: StrideError) -> StrideError {
        if self.max_retries == 0 || !error.is_retryable() {
            return error;
        }
        warn!(operation = operation_name, attempts, error = %error, "retries exhausted");
        StrideError::MaxRetriesExceeded {
            attempts,
            message: format!("{operation_name} failed after {attempts} attempt(s): {error}"),
        }
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut f: F) -> StrideResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = StrideResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation = operation_name, attempt = attempt + 1, "succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if self.should_retry(attempt, &error) => {
                    let delay = self.delay_for(attempt, &error);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(self.exhausted(operation_name, attempt + 1, error)),
            }
        }
    }
}
