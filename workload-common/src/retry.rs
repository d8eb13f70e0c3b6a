use std::future::Future;
use std::time;

use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("operation failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// How many times an operation is attempted and how long to wait between attempts.
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    max_attempts: u32,
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The wait before the first retry.
    initial_interval: time::Duration,
    /// The maximum possible wait between attempts.
    maximum_interval: Option<time::Duration>,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_coefficient,
            initial_interval,
            maximum_interval,
        }
    }

    /// A policy waiting the same interval between every attempt.
    pub fn fixed(max_attempts: u32, interval: time::Duration) -> Self {
        Self::new(max_attempts, 1, interval, None)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calculate the wait after a failed attempt, `attempt` counting from zero.
    pub fn time_until_next_retry(&self, attempt: u32) -> time::Duration {
        let candidate_interval = self
            .backoff_coefficient
            .checked_pow(attempt)
            .and_then(|factor| self.initial_interval.checked_mul(factor))
            .unwrap_or(time::Duration::MAX);

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }

    /// Run `operation` until it succeeds or the attempts run out.
    /// There is no wait after the final attempt, its error is returned straight away.
    pub async fn retry<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt + 1 >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: error,
                    });
                }
                Err(error) => {
                    let wait = self.time_until_next_retry(attempt);
                    warn!(
                        "attempt {}/{} failed, retrying in {:?}: {}",
                        attempt + 1,
                        self.max_attempts,
                        wait,
                        error
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, time::Duration::from_secs(5))
    }
}
