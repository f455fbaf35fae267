//! Retry policy with exponential backoff for remote calls

use crate::error::{EtlError, EtlResult};
use std::future::Future;
use std::time::Duration;

/// How often, and how patiently, a transient failure is retried
///
/// The delay before retry `n` (1-based) is `base_delay * multiplier^(n-1)`.
/// Only errors for which [`EtlError::is_transient`] holds are retried.
///
/// # Example
/// ```
/// use etl_orchestrator::client::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
/// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(2), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy; at least one attempt is always made and the
    /// multiplier never shrinks delays
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: if multiplier.is_finite() {
                multiplier.max(1.0)
            } else {
                1.0
            },
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Exhausting the attempts on
    /// transient errors yields [`EtlError::TransientSource`] carrying the
    /// attempt count and the last failure.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> EtlResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = EtlResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{} succeeded on attempt {}", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        what,
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(EtlError::TransientSource { message, .. }) => {
                    log::error!("{} failed after {} attempt(s): {}", what, attempt, message);
                    return Err(EtlError::TransientSource {
                        attempts: attempt,
                        message,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
