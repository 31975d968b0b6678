//! Retry utilities with exponential backoff for flaky provider APIs.

use std::time::Duration;
use tokio::time::sleep;

use crate::sources::SourceError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, the first call included
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Backoff before attempt `attempt + 1`, given `attempt` failures so far
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Sum of every backoff delay a fully exhausted call sleeps through
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|attempt| self.delay_for(attempt)).sum()
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, PartialEq)]
pub enum TransientError {
    /// Rate limit exceeded (with the server's retry-after hint, if any)
    RateLimit(Option<Duration>),
    /// Server error (5xx)
    ServerError,
    /// Request timeout
    Timeout,
    /// Network connectivity issues
    Network,
}

impl TransientError {
    /// Check if a SourceError represents a transient error
    pub fn from_source_error(err: &SourceError) -> Option<Self> {
        match err {
            SourceError::RateLimited { retry_after } => Some(TransientError::RateLimit(*retry_after)),
            SourceError::ServerError { .. } => Some(TransientError::ServerError),
            SourceError::Timeout => Some(TransientError::Timeout),
            SourceError::Network(_) => Some(TransientError::Network),
            _ => None,
        }
    }

    /// Minimum delay the server asked for
    pub fn floor(&self) -> Duration {
        match self {
            TransientError::RateLimit(Some(after)) => *after,
            _ => Duration::ZERO,
        }
    }
}

/// Execute an async operation, retrying transient provider errors
///
/// RateLimited, ServerError, Timeout and Network errors are retried up to
/// `config.max_attempts` total attempts; a `Retry-After` hint raises the
/// delay (still capped by `max_delay`). Anything else is returned at once.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::debug!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                let Some(transient) = TransientError::from_source_error(&error) else {
                    return Err(error);
                };
                let floor = transient.floor();

                if attempts >= config.max_attempts {
                    tracing::warn!("Operation failed after {} attempts: {}", attempts, error);
                    return Err(error);
                }

                let delay = config.delay_for(attempts).max(floor).min(config.max_delay);

                tracing::debug!(
                    "Transient error on attempt {}/{}: {}, retrying in {:?}",
                    attempts,
                    config.max_attempts,
                    error,
                    delay
                );

                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(fast_config(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Ok("success")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_twice_then_success() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(fast_config(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    let count = *call_count.borrow();
                    if count < 3 {
                        Err(SourceError::RateLimited { retry_after: None })
                    } else {
                        Ok("success")
                    }
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::BadRequest("invalid filter".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::BadRequest(_))));
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::NotFound("10.1000/missing".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::NotFound(_))));
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_attempts() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::ServerError {
                        status: 502,
                        message: "bad gateway".to_string(),
                    })
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::ServerError { status: 502, .. })));
        assert_eq!(*call_count.borrow(), 3);
    }

    #[test]
    fn test_total_backoff() {
        assert_eq!(fast_config().total_backoff(), Duration::from_millis(15));
        assert_eq!(fast_config().max_attempts(1).total_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 6,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(350));
        assert_eq!(config.delay_for(30), Duration::from_millis(350));
    }

    #[test]
    fn test_transient_error_detection() {
        assert_eq!(
            TransientError::from_source_error(&SourceError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }),
            Some(TransientError::RateLimit(Some(Duration::from_secs(2))))
        );
        assert!(TransientError::from_source_error(&SourceError::Timeout).is_some());
        assert!(TransientError::from_source_error(&SourceError::Parse("x".into())).is_none());
        assert!(
            TransientError::from_source_error(&SourceError::MissingCredential("k".into()))
                .is_none()
        );
    }

    #[test]
    fn test_retry_after_floor() {
        assert_eq!(
            TransientError::RateLimit(Some(Duration::from_secs(3))).floor(),
            Duration::from_secs(3)
        );
        assert_eq!(TransientError::ServerError.floor(), Duration::ZERO);
    }
}
