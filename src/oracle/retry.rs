//! Bounded retry with exponential backoff for oracle calls.
//!
//! Wraps a single oracle call with a per-attempt timeout and a classified
//! retry loop: rate limits, transient network failures, and timeouts are
//! retried with doubling delay; everything else surfaces immediately.
//! After the attempt budget is exhausted the last error is returned — the
//! caller (a filter stage) must treat it as a rejection, never a pass.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::oracle::OracleError;

/// Retry policy applied to one oracle call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles on each retry.
    pub base_delay: Duration,
    /// Per-attempt timeout. An elapsed timeout counts as a retriable error.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            timeout,
        }
    }

    /// Backoff before retry number `attempt` (1-indexed): base * 2^(attempt-1).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Execute `op` under `policy`, returning the first success or the last
/// classified error. The backoff sleep is scoped to this one call — it
/// never holds any shared lock.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    op: F,
) -> Result<T, OracleError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let outcome = match timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(policy.timeout.as_secs())),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retriable() || attempt >= policy.max_attempts {
            if attempt >= policy.max_attempts && err.is_retriable() {
                warn!(
                    call = what,
                    attempts = attempt,
                    error = %err,
                    "Retry budget exhausted"
                );
            }
            return Err(err);
        }

        let delay = policy.backoff_delay(attempt);
        debug!(
            call = what,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Oracle call failed, backing off"
        );
        sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(800));

        // Non-decreasing across the whole range
        for a in 1..10 {
            assert!(policy.backoff_delay(a + 1) >= policy.backoff_delay(a));
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = with_retry(&fast_policy(5), "test", || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, OracleError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_exhausts_exact_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, _> = with_retry(&fast_policy(5), "test", || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OracleError::RateLimited("always".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(OracleError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fatal_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, _> = with_retry(&fast_policy(5), "test", || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OracleError::Fatal("bad request".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(OracleError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, _> = with_retry(&fast_policy(5), "test", || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OracleError::NotFound("unknown token".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(OracleError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = with_retry(&fast_policy(5), "test", || {
            let calls = calls2.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(OracleError::Transient("flaky".into()))
                } else {
                    Ok(7u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_and_retries() {
        let policy = RetryPolicy::new(
            2,
            Duration::from_millis(1),
            Duration::from_millis(20),
        );
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, _> = with_retry(&policy, "test", || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(5)).await;
                Ok(1)
            }
        })
        .await;
        assert!(matches!(result, Err(OracleError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
