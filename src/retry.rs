//! Bounded retry policy for transient store failures
//!
//! Attempts are counted from 1. After attempt `n` fails with a retryable
//! error the policy sleeps `delay(n)` and tries again, until
//! `max_attempts` is reached. Sleeping goes through the [`Sleeper`] trait so
//! tests can observe delays without waiting on the wall clock.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that can tell whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Abstracts waiting so the clock can be faked in tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Linear backoff: the wait after attempt `n` is `step * n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, one second linear step
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt`: 1s, 2s, 3s, ... for a one second step
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. The last error is returned unchanged.
    pub async fn run<F, Fut, T, E>(&self, sleeper: &dyn Sleeper, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    warn!(attempts = attempt, error = %err, "Retries exhausted");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay(attempt);
                    debug!(
                        attempt,
                        max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
