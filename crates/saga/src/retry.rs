//! Bounded exponential backoff for transient downstream failures.

use std::future::Future;
use std::time::Duration;

use common::Classify;
use tokio::time::sleep;

/// Retry budget for one downstream call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hard attempt ceiling, including the first try.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier applied after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, for tests and compensation paths.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Runs `operation`, retrying only errors whose kind is retryable.
///
/// Non-retryable errors (insufficient stock, not-found, business rules)
/// return immediately; exhausting the attempt ceiling converts the last
/// transient error into the terminal failure handed to the caller.
pub async fn retry_transient<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.kind().is_retryable() && attempt < policy.max_attempts => {
                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying after delay"
                );
                sleep(delay).await;
                delay = Duration::from_millis(((delay.as_millis() as f64) * policy.multiplier) as u64)
                    .min(policy.max_delay);
            }
            Err(error) => return Err(error),
        }
    }
}
