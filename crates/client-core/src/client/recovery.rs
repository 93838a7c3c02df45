//! Error recovery and retry mechanisms for client operations
//!
//! This module provides utilities for handling transient failures: a retry
//! schedule shared by ad-hoc operations and the connection manager's
//! reconnect loop, a timeout wrapper, and contextual error wrapping.

use crate::error::{ClientError, ClientResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Configuration for retry behavior
///
/// Used both by [`retry_with_backoff`] and as the connection manager's
/// reconnect schedule. `max_attempts` is a hard ceiling — unbounded silent
/// retry is not allowed anywhere in the client.
///
/// # Examples
///
/// ```rust
/// # use calldesk_client_core::client::recovery::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::default();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.initial_delay, Duration::from_millis(100));
/// assert!(config.use_jitter);
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration for quick retries (short-lived network operations)
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    /// Configuration for slow retries (reconnecting the signaling channel)
    pub fn slow() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }

    /// Next backoff delay after `current`, capped at `max_delay`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.backoff_multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    /// Apply jitter (±10%) to a delay when configured
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.use_jitter {
            let jitter = (rand::random::<f64>() - 0.5) * 0.2;
            let millis = delay.as_millis() as f64;
            Duration::from_millis((millis * (1.0 + jitter)) as u64)
        } else {
            delay
        }
    }
}

/// Retry an operation with exponential backoff
///
/// The operation is retried only while it fails with a recoverable error
/// (per [`ClientError::is_recoverable`]) and attempts remain; anything else
/// returns immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = config.max_attempts,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis() as u64,
                    "Recoverable error, will retry"
                );

                sleep(config.jittered(delay)).await;
                delay = config.next_delay(delay);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after all retry attempts"
                    );
                } else {
                    error!(
                        operation = operation_name,
                        error = %e,
                        category = e.category(),
                        "Non-recoverable error, not retrying"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Context-aware error wrapper
///
/// Adds operation context to an error, logging it with structured fields as
/// it passes through.
pub trait ErrorContext<T> {
    /// Add context to the error
    fn context(self, context: &str) -> ClientResult<T>;

    /// Add context with lazy evaluation
    fn with_context<F>(self, f: F) -> ClientResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for ClientResult<T> {
    fn context(self, context: &str) -> ClientResult<T> {
        self.map_err(|e| {
            error!(
                error = %e,
                context = context,
                category = e.category(),
                "Operation failed with context"
            );
            ClientError::InternalError {
                message: format!("{}: {}", context, e),
            }
        })
    }

    fn with_context<F>(self, f: F) -> ClientResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            error!(
                error = %e,
                context = %context,
                category = e.category(),
                "Operation failed with context"
            );
            ClientError::InternalError {
                message: format!("{}: {}", context, e),
            }
        })
    }
}

/// Wrap an async operation with a timeout, converting expiry into
/// [`ClientError::OperationTimeout`]
pub async fn with_timeout<T, F>(
    operation_name: &str,
    timeout: Duration,
    future: F,
) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(ClientError::OperationTimeout {
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_with_backoff_success() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff("test_operation", RetryConfig::quick(), || async {
            let current = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if current < 3 {
                Err(ClientError::NetworkError {
                    reason: "temporary failure".to_string(),
                })
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_recoverable() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let attempts = AtomicU32::new(0);

        let result: Result<i32, _> =
            retry_with_backoff("test_operation", RetryConfig::default(), || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::InvalidConfiguration {
                    field: "test".to_string(),
                    reason: "bad config".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1); // Should not retry
    }

    #[test]
    fn test_next_delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
            backoff_multiplier: 2.0,
            use_jitter: false,
        };
        assert_eq!(
            config.next_delay(Duration::from_secs(10)),
            Duration::from_secs(15)
        );
    }
}
