//! Bounded retry with exponential backoff for ledger and content-store calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use faceproof_cas::CasError;
use faceproof_ledger::LedgerError;
use tracing::warn;

/// Errors a [`RetryPolicy`] knows how to classify.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// The error reported when an attempt exceeds the call timeout.
    fn timed_out() -> Self;
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        LedgerError::is_retryable(self)
    }

    fn timed_out() -> Self {
        LedgerError::Timeout
    }
}

impl Retryable for CasError {
    fn is_retryable(&self) -> bool {
        CasError::is_retryable(self)
    }

    fn timed_out() -> Self {
        CasError::Timeout
    }
}

/// Per-call retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per call, including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for a single attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with the default call timeout.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1`: `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempts are used up. `op` and `key` label the log lines.
    pub async fn run<T, E, F, Fut>(&self, op: &str, key: &str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Retryable + Display + Send,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(r) => r,
                Err(_) => Err(E::timed_out()),
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let backoff = self.delay_for(attempt);
                    warn!(op, key, attempt, error = %e, ?backoff, "retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            call_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_secs(1));
        assert_eq!(p.delay_for(4), Duration::from_secs(4));
        assert_eq!(p.delay_for(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let out = fast(3)
            .run("get", "k", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(LedgerError::Unavailable("down".into()))
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
    async fn test_permanent_error_returns_at_once() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = fast(5)
            .run("confirm", "k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LedgerError::AlreadyExists("k".into())) }
            })
            .await;
        assert_eq!(out.unwrap_err(), LedgerError::AlreadyExists("k".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = fast(2)
            .run("put", "k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CasError::Unavailable("down".into())) }
            })
            .await;
        assert!(out.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let out: Result<(), CasError> = fast(1)
            .run("get", "k", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(out.unwrap_err(), CasError::Timeout);
    }
}
