//! Exponential backoff with jitter for transient remote failures.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry policy for fallible remote operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap applied to the computed delay.
    pub max_delay: Duration,
    /// Exponential growth factor.
    pub multiplier: f64,
    /// Multiply each delay by a uniform factor in [0.75, 1.25].
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay before retry attempt `attempt` (1-based):
    /// `min(initial * multiplier^(attempt-1), max_delay)`, jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base = self.initial_delay.as_secs_f64() * exp;
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = if self.jitter {
            capped * rand::rng().random_range(0.75..=1.25)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

/// Run `op`, retrying per `policy` while `is_retryable` approves the
/// error. Non-retryable errors propagate immediately; the last error is
/// surfaced when attempts are exhausted.
pub async fn retry_with_policy<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !is_retryable(&err) {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
