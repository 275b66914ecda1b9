use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Classification of errors for retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableError {
    /// Provider signalled a rate limit - retry with the longer delay ramp
    RateLimit,
    /// Timeout or connection failure - retry with the shorter delay ramp
    Transport,
    /// Other errors - don't retry
    Other,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including initial attempt)
    pub max_retries: u32,
    /// Base delay for rate-limit errors; retry n waits base * (n+1)
    pub rate_limit_base_delay_ms: u64,
    /// Base delay for transport errors; retry n waits base * (n+1)
    pub transport_base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_base_delay_ms: 5_000,
            transport_base_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-indexed) for an error class.
    /// None means the error is not retryable.
    fn get_delay(&self, attempt: u32, error_type: RetryableError) -> Option<Duration> {
        let base_ms = match error_type {
            RetryableError::RateLimit => self.rate_limit_base_delay_ms,
            RetryableError::Transport => self.transport_base_delay_ms,
            RetryableError::Other => return None,
        };

        Some(Duration::from_millis(base_ms * (attempt as u64 + 1)))
    }
}

/// Retry an async operation with linearly growing backoff
///
/// # Arguments
/// * `operation` - The async operation to retry (a closure returning a Future)
/// * `config` - Retry configuration
/// * `classify_error` - Function to classify errors for retry strategy
///
/// # Returns
/// * `Ok(T)` - Operation succeeded (either on first attempt or after retries)
/// * `Err(E)` - Operation failed after all retries exhausted, or with a
///   non-retryable error
///
/// # Example
/// ```ignore
/// let result = retry_with_backoff(
///     || async { provider_call().await },
///     &RetryConfig::default(),
///     |e| if e.is_rate_limit() { RetryableError::RateLimit } else { RetryableError::Other }
/// ).await;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig,
    classify_error: impl Fn(&E) -> RetryableError,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} retry attempts", attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                let error_type = classify_error(&e);

                if error_type == RetryableError::Other {
                    error!("Operation failed with non-retryable error: {}", e);
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    error!(
                        "Operation failed after {} attempts (max retries exhausted): {}",
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = match config.get_delay(attempt, error_type) {
                    Some(d) => d,
                    None => return Err(e),
                };

                warn!(
                    "Operation failed (attempt {}/{}): {} - retrying in {}ms (error type: {:?})",
                    attempt + 1,
                    config.max_retries + 1,
                    e,
                    delay.as_millis(),
                    error_type
                );

                tokio::time::sleep(delay).await;

                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct TestError {
        kind: &'static str,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.kind)
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            rate_limit_base_delay_ms: 10,
            transport_base_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let result = retry_with_backoff(
            || async { Ok::<_, TestError>(42) },
            &RetryConfig::default(),
            |_| RetryableError::Other,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let attempts = Cell::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.set(attempts.get() + 1);
                Err::<i32, _>(TestError { kind: "fatal" })
            },
            &RetryConfig::default(),
            |_| RetryableError::Other,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1); // Should not retry
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let attempts = Cell::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.set(attempts.get() + 1);
                if attempts.get() < 3 {
                    Err(TestError { kind: "rate_limit" })
                } else {
                    Ok(42)
                }
            },
            &fast_config(3),
            |_| RetryableError::RateLimit,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let attempts = Cell::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.set(attempts.get() + 1);
                Err::<i32, _>(TestError { kind: "transport" })
            },
            &fast_config(2),
            |_| RetryableError::Transport,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.get(), 3); // Initial + 2 retries
    }

    #[tokio::test]
    async fn test_delay_grows_linearly() {
        let config = fast_config(3);
        assert_eq!(
            config.get_delay(0, RetryableError::RateLimit),
            Some(Duration::from_millis(10))
        );
        assert_eq!(
            config.get_delay(2, RetryableError::RateLimit),
            Some(Duration::from_millis(30))
        );
        assert_eq!(config.get_delay(0, RetryableError::Other), None);
    }
}
