//! Uniform retry policy for backend calls.
//!
//! Only overloaded-class errors are retried; credential failures and
//! malformed output go straight back to the caller.

use crate::backend::BackendError;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,

    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Run `f` up to `policy.attempts` times, sleeping between attempts with a
/// doubling delay. Retries only [`BackendError::Overloaded`]; every other
/// error ends the call immediately. After the final attempt the last error
/// is returned as-is.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = policy.attempts.max(1);
    let mut delay = policy.base_delay;

    for attempt in 1..=attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_overloaded() && attempt < attempts => {
                log::warn!("backend overloaded, retrying in {delay:?} (attempt {attempt}/{attempts})");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(error) => return Err(error),
        }
    }

    // attempts >= 1 means the loop always returns.
    unreachable!("retry loop returned without a result")
}
