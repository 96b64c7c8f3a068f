//! Bounded retry with exponential backoff
//!
//! Wraps any fallible async operation. Attempts run strictly one after another; between
//! attempts the executor sleeps `delay`, then multiplies `delay` by `backoff`.
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Success | Return immediately |
//! | Recoverable error, attempts left | Warn, sleep, retry |
//! | Recoverable error, last attempt | Propagate |
//! | Non-recoverable error | Propagate immediately |

use crate::config::FetchConfig;
use crate::{RenderError, SweepError};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Classifies errors the retry executor may try again
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RenderError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for SweepError {
    fn is_retryable(&self) -> bool {
        match self {
            SweepError::Render(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Attempt count and wait schedule for [`retry`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub tries: u32,
    /// Wait before the first retry
    pub delay: Duration,
    /// Multiplier applied to the wait after each retry, at least 1.0
    pub backoff: f64,
}

impl RetryPolicy {
    /// Creates a policy, clamping `tries` and `backoff` into their valid ranges
    pub fn new(tries: u32, delay: Duration, backoff: f64) -> Self {
        let backoff = if backoff.is_finite() && backoff >= 1.0 {
            backoff
        } else {
            1.0
        };
        Self {
            tries: tries.max(1),
            delay,
            backoff,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            config.tries,
            Duration::from_millis(config.retry_delay_ms),
            config.backoff,
        )
    }

    /// Upper bound on the time spent sleeping across all attempts
    pub fn max_total_delay(&self) -> Duration {
        let retries = self.tries.saturating_sub(1);
        let delay = self.delay.as_secs_f64();
        let total = if self.backoff == 1.0 {
            delay * f64::from(retries)
        } else {
            delay * (self.backoff.powi(retries as i32) - 1.0) / (self.backoff - 1.0)
        };
        Duration::try_from_secs_f64(total).unwrap_or(Duration::MAX)
    }

    fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Runs `op` under `policy`, sleeping with tokio's timer between attempts
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    retry_with_sleep(policy, op, tokio::time::sleep).await
}

/// Same as [`retry`] with an injectable sleep
pub async fn retry_with_sleep<T, E, F, Fut, S, SFut>(
    policy: &RetryPolicy,
    mut op: F,
    mut sleep: S,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let mut delay = policy.delay;
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.tries && e.is_retryable() => {
                tracing::warn!(
                    "Retryable error (attempt {}/{}): {}; retrying in {:?}",
                    attempt,
                    policy.tries,
                    e,
                    delay
                );
                sleep(delay).await;
                delay = policy.next_delay(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
