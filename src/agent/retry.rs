//! Bounded retry with exponential backoff for model calls.

use crate::config::AgentSettings;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently to retry a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: usize) -> Duration {
        let factor = 1u32.checked_shl(retry.min(31) as u32).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl From<&AgentSettings> for RetryPolicy {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

/// Run `operation`, repeating it while it fails with a retryable error and
/// retries remain. Non-retryable errors are returned immediately.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && retry < policy.max_retries => {
                let delay = policy.backoff(retry);
                warn!(
                    "Retryable failure (attempt {} of {}): {}; retrying in {:?}",
                    retry + 1,
                    policy.max_retries + 1,
                    error,
                    delay
                );
                retry += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookMindError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instant(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::none()
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(instant(3), || {
            let current = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if current < 2 {
                    Err(BookMindError::UpstreamUnavailable("busy".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_with_backoff(instant(2), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(BookMindError::UpstreamUnavailable("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(BookMindError::UpstreamUnavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_with_backoff(instant(5), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(BookMindError::UpstreamError("bad request".into())) }
        })
        .await;

        assert!(matches!(result, Err(BookMindError::UpstreamError(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
