//! Retry with exponential backoff.
//!
//! The same policy object is applied at two distinct layers: the capability
//! clients (per external call) and the workflow engine (per phase). Keeping
//! the policy explicit keeps the two retry scopes distinguishable in tests.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Policy with no sleeping between attempts. Used in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based): base delay doubling
    /// per attempt, capped to avoid pathological sleeps.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(5));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Run `operation` until it succeeds or the policy's attempts are exhausted,
/// sleeping the policy's backoff between attempts. The last error is returned
/// as-is; callers wrap it with their own context.
pub async fn retry_with_policy<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(error);
                }

                tracing::warn!(attempt, error = %error, "attempt failed, backing off");
                sleep(policy.delay_for(attempt)).await;
            }
        }
    }
}
