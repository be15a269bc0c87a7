// src/retry.rs
//! Bounded retry with exponential back-off and a per-attempt deadline.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;
use crate::report::{PassEvent, Reporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. On failure returns the last error and the
    /// number of attempts made.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        reporter: &dyn Reporter,
        mut op: F,
    ) -> Result<T, (FetchError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout(self.timeout)),
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < max => {
                    reporter.report(PassEvent::FetchRetry {
                        what: what.to_string(),
                        attempt,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(self.delay_after(attempt)).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            backoff: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let rep = MemoryReporter::new();
        let out = fast(3)
            .run("page", &rep, || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Transport("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(out, Ok(7));
        assert_eq!(rep.events().len(), 2);
    }

    #[tokio::test]
    async fn decode_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let rep = MemoryReporter::new();
        let out: Result<(), _> = fast(5)
            .run("page", &rep, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Decode("junk".into()))
            })
            .await;
        assert_eq!(out, Err((FetchError::Decode("junk".into()), 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stuck_call_times_out() {
        let rep = MemoryReporter::new();
        let out: Result<(), _> = fast(2)
            .run("body", &rep, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        let (err, attempts) = out.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
        assert_eq!(attempts, 2);
    }
}
