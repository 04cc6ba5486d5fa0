//! Fixed-delay retry for transient network failures.

use std::{fmt::Display, future::Future, time::Duration};

use tracing::debug;

const RETRYABLE_PATTERNS: &[&str] = &[
    "deadline exceeded",
    "connection reset",
    "connection refused",
    "timeout",
    "timed out",
    "temporary failure",
    "unavailable",
];

/// Whether an error message looks like a transient network failure.
#[must_use]
pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Failure after the policy gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The error was not transient; returned after the first attempt.
    #[error("{0}")]
    Permanent(E),
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent(e) | Self::Exhausted { last: e, .. } => e,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. No delay follows the final attempt.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !is_retryable(&err.to_string()) {
            return Err(RetryError::Permanent(err));
        }
        if attempt >= attempts {
            return Err(RetryError::Exhausted {
                attempts,
                last: err,
            });
        }
        debug!(operation, attempt, error = %err, "attempt failed, retrying");
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use {
        super::*,
        std::sync::atomic::{AtomicU32, Ordering},
    };

    fn quick() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, RetryError<String>> = with_retry(quick(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("connection reset by peer".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let out: Result<(), RetryError<String>> = with_retry(quick(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("request timeout".to_string()) }
        })
        .await;
        let err = out.unwrap_err();
        assert!(err.to_string().starts_with("max retries exceeded"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<(), RetryError<String>> = with_retry(quick(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("invalid recipient".to_string()) }
        })
        .await;
        assert!(matches!(out, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retryable_patterns() {
        assert!(is_retryable("Service Unavailable"));
        assert!(is_retryable("temporary failure in name resolution"));
        assert!(!is_retryable("bad request"));
    }
}
