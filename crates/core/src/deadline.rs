//! Deadline handle shared by all phases of a provisioning run.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Raised when an operation outlives the shared deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

/// A fixed point in time that bounds a whole provisioning run. Cheap to
/// copy; every phase and inner gateway call shares the same handle.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Acquire a deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Fail fast if the deadline has passed.
    pub fn check(&self) -> Result<(), DeadlineExceeded> {
        if self.expired() {
            Err(DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Race `fut` against the remaining budget.
    pub async fn wrap<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> Result<T, E>
    where
        E: From<DeadlineExceeded>,
    {
        self.check()?;
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(DeadlineExceeded.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Deadline,
        Other,
    }

    impl From<DeadlineExceeded> for TestError {
        fn from(_: DeadlineExceeded) -> Self {
            Self::Deadline
        }
    }

    #[test]
    fn zero_budget_expires_immediately() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.check(), Err(DeadlineExceeded));
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn wrap_with_zero_budget_fails_before_polling() {
        let deadline = Deadline::after(Duration::ZERO);
        let result: Result<(), TestError> = deadline.wrap(async { Ok(()) }).await;
        assert_eq!(result, Err(TestError::Deadline));
    }

    #[tokio::test(start_paused = true)]
    async fn wrap_times_out_slow_operations() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let result: Result<(), TestError> = deadline
            .wrap(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(TestError::Deadline));
    }

    #[tokio::test]
    async fn wrap_passes_through_inner_results() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let ok: Result<u32, TestError> = deadline.wrap(async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        let err: Result<u32, TestError> = deadline.wrap(async { Err(TestError::Other) }).await;
        assert_eq!(err, Err(TestError::Other));
    }
}
