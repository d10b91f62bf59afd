// Retry logic for poll loops and non-blocking sends
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay
    Retry(Duration),
    /// Attempt budget used up
    Exhausted,
}

/// Bounded-attempt retry policy with a fixed sleep slice
///
/// A policy built with `from_timeout(t, n)` makes at most `n` attempts and
/// sleeps `t / n` between them, so a loop driven by it never outlives `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Spread `attempts` evenly over `timeout`
    pub fn from_timeout(timeout: Duration, attempts: u32) -> Self {
        let attempts = attempts.max(1);
        Self::new(attempts, timeout / attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide what to do after `failures` unsuccessful attempts
    ///
    /// # Example
    /// ```text
    /// match policy.decide(failures) {
    ///     RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
    ///     RetryDecision::Exhausted => return Err(...),
    /// }
    /// ```
    pub fn decide(&self, failures: u32) -> RetryDecision {
        if failures >= self.max_attempts {
            debug!(
                failures = failures,
                max_attempts = self.max_attempts,
                "Retry budget exhausted"
            );
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry(self.interval)
    }

    /// Run `probe` until it yields a value or the budget is used up
    ///
    /// Returns `Ok(None)` when every attempt came back empty. Errors from the
    /// probe abort the loop.
    pub async fn poll<T, F, Fut>(&self, mut probe: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let mut failures = 0;
        loop {
            if let Some(value) = probe().await? {
                return Ok(Some(value));
            }
            failures += 1;

            match self.decide(failures) {
                RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
                RetryDecision::Exhausted => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::time::Instant;

    #[test]
    fn test_from_timeout_interval() {
        let policy = RetryPolicy::from_timeout(Duration::from_secs(10), 80);
        assert_eq!(policy.max_attempts(), 80);
        assert_eq!(policy.interval(), Duration::from_millis(125));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::from_timeout(Duration::from_secs(1), 0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        assert_eq!(policy.decide(1), RetryDecision::Retry(Duration::from_millis(5)));
        assert_eq!(policy.decide(2), RetryDecision::Retry(Duration::from_millis(5)));
        assert_eq!(policy.decide(3), RetryDecision::Exhausted);
    }

    #[tokio::test]
    async fn test_poll_succeeds_on_third_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let mut calls = 0;

        let value = policy
            .poll(|| {
                calls += 1;
                let ready = calls == 3;
                async move { Ok(ready.then_some("endpoint")) }
            })
            .await
            .unwrap();

        assert_eq!(value, Some("endpoint"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_poll_exhausts_exact_budget_in_bounded_time() {
        let policy = RetryPolicy::from_timeout(Duration::from_millis(100), 10);
        let mut calls = 0;
        let started = Instant::now();

        let value: Option<()> = policy
            .poll(|| {
                calls += 1;
                async { Ok(None) }
            })
            .await
            .unwrap();

        assert_eq!(value, None);
        assert_eq!(calls, 10);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_poll_propagates_probe_error() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let result: Result<Option<()>> = policy
            .poll(|| async { Err(AppError::Config("boom".into())) })
            .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
