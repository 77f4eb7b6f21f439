//! Bounded exponential-backoff retry for startup-critical portal calls
//!
//! Only the calls that decide whether a profile can start at all go through
//! here (handshake, authentication, channel retrieval). Steady-state watchdog
//! ticks never retry; they log and wait for the next tick.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::errors::AppError;

/// Errors that know whether another attempt can succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        AppError::is_retryable(self)
    }
}

/// Retry executor with capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delay slept after the failed attempt number `attempt` (0-based):
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` attempts have been made.
    ///
    /// Returns the first success or the last observed error.
    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            "Operation '{}' succeeded on attempt {}/{}",
                            operation_name,
                            attempt + 1,
                            attempts
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        debug!(
                            "Operation '{}' failed with non-retryable error: {}",
                            operation_name, err
                        );
                        return Err(err);
                    }

                    if attempt + 1 >= attempts {
                        warn!(
                            "Operation '{}' failed after {} attempts: {}",
                            operation_name, attempts, err
                        );
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "Operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                        operation_name,
                        attempt + 1,
                        attempts,
                        delay,
                        err
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1))
    }

    #[test]
    fn test_delay_for_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(800));
        assert_eq!(p.delay_for(4), Duration::from_secs(1));
        assert_eq!(p.delay_for(40), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<&str, AppError> = policy()
            .run("flaky", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AppError::transient("connection reset"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms after the first failure, 200ms after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(350), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_after_exhaustion() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), AppError> = policy()
            .run("always-failing", || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::transient(format!("failure {n}")))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(AppError::TransientNetwork { message }) => assert_eq!(message, "failure 2"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), AppError> = policy()
            .run("auth", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::invalid_credentials("bad password"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AppError::InvalidCredentials { .. })));
    }
}
