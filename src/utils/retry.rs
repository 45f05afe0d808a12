//! Bounded retry with exponential backoff.
//!
//! Every network call of the pipeline goes through [`RetryExecutor`], each call
//! site choosing its own label so the retry log lines say what was retried.
//! Errors that are marked non-retryable (see [`IndexerError::is_retryable`])
//! short-circuit the loop: a malformed response will not get better by asking
//! again.

use std::future::Future;
use std::time::Duration;

use log::warn;

use crate::error::IndexerError;

/// Retry configuration. Attempts are counted from 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
        }
    }

    /// Wait after the given failed attempt: `base_delay * backoff_factor^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }
}

/// Runs async operations under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Result<Self, IndexerError> {
        if policy.max_attempts == 0 {
            return Err(IndexerError::Config(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if !policy.backoff_factor.is_finite() || policy.backoff_factor <= 0.0 {
            return Err(IndexerError::Config(format!(
                "retry backoff_factor must be a positive number, got {}",
                policy.backoff_factor
            )));
        }
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute with the default observer, which logs every retry at WARN.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, IndexerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.policy.max_attempts;
        self.execute_with(operation_name, operation, |err, attempt| {
            warn!(
                "Retrying {} (attempt {}/{}): {:#}",
                operation_name, attempt, max_attempts, err
            );
        })
        .await
    }

    /// Execute, calling `on_retry(error, attempt)` before each backoff wait.
    ///
    /// The observer cannot influence the outcome: it sees the error by reference
    /// and the final error returned is always the last one produced by `operation`.
    pub async fn execute_with<T, F, Fut, O>(
        &self,
        operation_name: &str,
        mut operation: F,
        mut on_retry: O,
    ) -> Result<T, IndexerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        O: FnMut(&anyhow::Error, u32),
    {
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retryable(&err) {
                        return Err(into_indexer_error(err));
                    }

                    if attempt >= self.policy.max_attempts {
                        return Err(IndexerError::RetryExhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            last: err,
                        });
                    }

                    on_retry(&err, attempt);
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;
                },
            }
        }
    }
}

fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<IndexerError>()
        .map(IndexerError::is_retryable)
        .unwrap_or(true)
}

fn into_indexer_error(err: anyhow::Error) -> IndexerError {
    match err.downcast::<IndexerError>() {
        Ok(indexer_error) => indexer_error,
        Err(other) => IndexerError::Upstream(other),
    }
}
