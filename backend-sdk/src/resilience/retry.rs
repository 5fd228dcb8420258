//! Retry with exponential backoff for recoverable errors
//!
//! A single policy keyed on error kind and operation mutability. Read-only
//! operations are re-attempted on `TransientNetwork` and `RateLimited`;
//! mutating operations run exactly once.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;

use super::OperationClass;
use crate::error::{Result, ServiceError};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one (1 means no retries)
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_interval: Duration,

    /// Maximum backoff duration
    pub max_interval: Duration,

    /// Multiplier for backoff between retries
    pub multiplier: f64,

    /// Randomization applied to each interval
    pub randomization_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            randomization_factor: 0.2,
        }
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryConfig {{ max_attempts: {}, initial_interval: {:?}, max_interval: {:?}, multiplier: {}, randomization_factor: {} }}",
            self.max_attempts,
            self.initial_interval,
            self.max_interval,
            self.multiplier,
            self.randomization_factor
        )
    }
}

/// The shared retry policy every adapter routes its backend calls through
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the specified configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// A policy that never retries, regardless of operation class
    pub fn no_retry() -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        })
    }

    /// Run `operation` under this policy
    ///
    /// `label` only feeds log lines.
    pub async fn run<F, Fut, T>(&self, label: &str, class: OperationClass, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_interval)
            .with_max_interval(self.config.max_interval)
            .with_multiplier(self.config.multiplier)
            .with_randomization_factor(self.config.randomization_factor)
            .with_max_elapsed_time(None)
            .build();

        let max_attempts = if class.is_retryable() {
            self.config.max_attempts.max(1)
        } else {
            1
        };
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err) && attempt < max_attempts => {
                    let delay = backoff.next_backoff().unwrap_or(self.config.max_interval);
                    log::warn!(
                        "{} failed with {} ({}), retrying in {:?} (attempt {}/{})",
                        label,
                        err.kind(),
                        err.message(),
                        delay,
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        return Err(err.with_context_value("attempts", attempt));
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Determine if an error should be retried
    fn should_retry(&self, error: &ServiceError) -> bool {
        error.is_retryable()
    }

    /// Get the current retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(20),
            ..RetryConfig::default()
        })
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let policy = RetryPolicy::default();
        let result = policy
            .run("op", OperationClass::Read, || async { Ok::<_, ServiceError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_read_retries_transient_until_success() {
        let attempts = AtomicUsize::new(0);

        let result = fast_policy()
            .run("read", OperationClass::Read, || {
                let current = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if current < 2 {
                        Err(ServiceError::transient_network("connection reset"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_max_attempts() {
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = fast_policy()
            .run("read", OperationClass::Read, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::rate_limited("429")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(err.context().unwrap().data.get("attempts").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn test_mutating_never_retries() {
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = fast_policy()
            .run("create", OperationClass::Mutating, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::transient_network("timed out")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::TransientNetwork);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_on_non_retryable_error() {
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = fast_policy()
            .run("read", OperationClass::Read, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::validation("Invalid input")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
