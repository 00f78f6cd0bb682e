//! Bounded retry with exponential backoff for transient failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `None` retries until the
    /// operation succeeds or fails with a non-transient error.
    pub attempts: Option<u32>,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for the delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Fixed number of attempts with no wait in between.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts: Some(attempts),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Fixed number of attempts with capped exponential backoff.
    pub fn backoff(attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: Some(attempts),
            initial_delay,
            max_delay,
        }
    }

    /// Keep trying until success or a non-transient error.
    pub fn unbounded(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: None,
            initial_delay,
            max_delay,
        }
    }

    /// Status store calls: two attempts, no wait.
    pub fn store() -> Self {
        Self::immediate(2)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::backoff(3, Duration::from_secs(2), Duration::from_secs(60))
    }
}

/// Run `op` until it succeeds, fails with an error `is_transient` rejects,
/// or the policy runs out of attempts. The last error is returned.
pub async fn retry_async<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let exhausted = policy.attempts.is_some_and(|max| attempt >= max);
                if exhausted || !is_transient(&e) {
                    return Err(e);
                }

                warn!(
                    operation = label,
                    error = %e,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
        }
    }
}
