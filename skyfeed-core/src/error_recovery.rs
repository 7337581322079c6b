//! Retry with exponential backoff for transient failures.
//!
//! Only errors that report themselves as retryable through [`ErrorExt`] are
//! retried; anything else is returned on the first attempt.

use crate::ErrorExt;
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Backoff parameters for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Login retries: three attempts, waiting 2s then 4s, never more than 30s.
    pub fn authentication() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorExt + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;

                if attempt >= policy.max_attempts || !error.is_retryable() {
                    return Err(error);
                }

                // The server's own hint wins over our schedule
                if let Some(hint) = error.retry_after() {
                    delay = delay.max(hint);
                }
                delay = delay.min(policy.max_delay);

                info!(
                    "Attempt {}/{} failed. Retrying after {:?}: {}",
                    attempt, policy.max_attempts, delay, error
                );

                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
        }
    }
}
