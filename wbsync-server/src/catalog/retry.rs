//! Fixed-delay retry for transient catalog failures
//!
//! Only `FetchError::Transient` is retried. Data-shape errors and a confirmed
//! "not found" are returned on the first attempt.

use std::future::Future;
use std::time::{Duration, Instant};

use super::FetchError;

/// How often and how patiently a fetch is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Never less than 1.
    pub max_attempts: u32,
    /// Sleep between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// `max_attempts` tries with no delay in between
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Terminal result of a retried operation
#[derive(Debug)]
pub(crate) enum RetryFailure {
    /// Every attempt failed transiently; carries the last error message
    Exhausted { attempts: u32, last_error: String },
    /// Non-retryable failure on the given attempt
    Fatal { attempt: u32, error: FetchError },
}

/// Run `operation` until it succeeds, fails non-transiently, or the policy
/// runs out of attempts.
pub(crate) async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Catalog request succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(FetchError::Transient(message)) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %message,
                        "Catalog request failed: retries exhausted"
                    );
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt,
                        last_error: message,
                    });
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %message,
                    "Catalog request failed, will retry after delay"
                );

                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(error) => {
                return Err(RetryFailure::Fatal { attempt, error });
            }
        }
    }
}
