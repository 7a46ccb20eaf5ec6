//! Retry executor with exponential backoff
//!
//! Runs a zero-argument async operation, retrying while the policy's
//! predicate says the classified failure is worth another attempt. Only the
//! last failure is surfaced; earlier ones are logged at WARN.
//!
//! The executor does not know whether an operation is idempotent. Callers
//! only wrap reads, or writes the collaborator de-duplicates.
//!
//! ```no_run
//! use pagepilot_core_resilience::{with_retry, ClassifiedError, RetryPolicy};
//!
//! # async fn example() -> Result<(), ClassifiedError> {
//! let policy = RetryPolicy::default();
//! let value = with_retry(&policy, || async {
//!     Ok::<_, ClassifiedError>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::backoff::{self, BackoffSchedule};
use crate::error::{ClassifiedError, ErrorKind, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Status codes the default predicate treats as transient
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Decides whether a classified failure deserves another attempt
pub type RetryPredicate = Arc<dyn Fn(&ClassifiedError) -> bool + Send + Sync>;

/// Default retry decision
///
/// Retries transient status codes, network-level faults (timeouts,
/// resets, unreachable hosts) and rate limits. The upstream status wins
/// over the kind's conventional code when a response was received.
pub fn default_retryable(err: &ClassifiedError) -> bool {
    let status = err.upstream_status.unwrap_or(err.status_code);
    let retryable_status = RETRYABLE_STATUS_CODES.contains(&status);
    let network = err.network_fault.is_some();
    retryable_status || network || err.is_rate_limit()
}

/// Retry configuration
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay before the first retry
    pub initial_delay: Duration,
    /// Factor applied to the base delay after each retry
    pub backoff_multiplier: f64,
    /// Ceiling on any single wait
    pub max_delay: Duration,
    retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            retryable: Arc::new(default_retryable),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Single attempt, never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Replace the retry predicate
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ClassifiedError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Retry only when the failure kind is one of `kinds`
    pub fn retry_on_kinds(self, kinds: &[ErrorKind]) -> Self {
        let kinds = kinds.to_vec();
        self.with_predicate(move |err| kinds.contains(&err.kind))
    }

    pub fn is_retryable(&self, err: &ClassifiedError) -> bool {
        (self.retryable)(err)
    }

    /// Backoff delays this policy would compute, before rate-limit overrides
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule::new(self.initial_delay, self.backoff_multiplier, self.max_delay)
    }
}

/// Result of a retried operation together with how many attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    pub fn into_result(self) -> Result<T> {
        self.result
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Execute `operation` under `policy`, reporting the attempt count
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut schedule = policy.schedule();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(err) => err,
        };

        if attempt >= max_attempts || !policy.is_retryable(&err) {
            return RetryOutcome {
                result: Err(err),
                attempts: attempt,
            };
        }

        // The schedule advances even when a rate-limit hint replaces the wait
        let computed = schedule.next().unwrap_or(policy.max_delay);
        let hint = if err.is_rate_limit() {
            err.retry_after
        } else {
            None
        };
        let wait = backoff::wait_before_retry(computed, hint, policy.max_delay);

        warn!(
            attempt,
            max_attempts,
            wait_ms = wait.as_millis() as u64,
            kind = %err.kind,
            status_code = err.status_code,
            error = %err.message,
            "Attempt {}/{} failed. Retrying in {}ms...",
            attempt,
            max_attempts,
            wait.as_millis()
        );

        backoff::sleep(wait).await;
    }
}

/// Execute `operation` under `policy`, surfacing only the final result
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry(policy, operation).await.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkFault;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Fails `failures` times with `err`, then succeeds
    fn flaky(
        failures: u32,
        err: ClassifiedError,
    ) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<u32>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                std::future::ready(Err(err.clone()))
            } else {
                std::future::ready(Ok(n))
            }
        };
        (calls, op)
    }

    #[test]
    fn test_default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(1000));
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert_eq!(policy.max_delay, Duration::from_millis(30_000));
    }

    #[test]
    fn test_default_predicate() {
        assert!(default_retryable(&ClassifiedError::external("bad gateway")));
        assert!(default_retryable(&ClassifiedError::new(
            ErrorKind::RateLimit,
            "slow down"
        )));
        assert!(default_retryable(&ClassifiedError::new(
            ErrorKind::ServiceUnavailable,
            "no response"
        )));
        assert!(default_retryable(&ClassifiedError::database("gone")));
        assert!(default_retryable(
            &ClassifiedError::new(ErrorKind::Unknown, "reset")
                .with_network_fault(NetworkFault::ConnectionReset)
        ));

        assert!(!default_retryable(&ClassifiedError::validation("bad input")));
        assert!(!default_retryable(&ClassifiedError::new(
            ErrorKind::Authentication,
            "expired token"
        )));
        assert!(!default_retryable(&ClassifiedError::not_found("gone")));
    }

    #[test]
    fn test_default_predicate_uses_upstream_status() {
        for status in [400, 404, 409, 422] {
            let err = ClassifiedError::external("Facebook API error").with_upstream_status(status);
            assert!(!default_retryable(&err), "status {}", status);
        }
        for status in [408, 500, 503, 504] {
            let err = ClassifiedError::external("Facebook API error").with_upstream_status(status);
            assert!(default_retryable(&err), "status {}", status);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_bad_request_is_not_retried() {
        let bad_request = ClassifiedError::external("bad request").with_upstream_status(400);
        let (calls, op) = flaky(5, bad_request);
        let outcome = retry(&RetryPolicy::default(), op).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let unavailable = ClassifiedError::external("unavailable").with_upstream_status(503);
        let (calls, op) = flaky(1, unavailable);
        let outcome = retry(&RetryPolicy::default(), op).await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let (calls, op) = flaky(2, ClassifiedError::external("boom"));
        let outcome = retry(&RetryPolicy::default(), op).await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded_by_max_attempts() {
        for failures in 0..6 {
            for kind in [ErrorKind::RateLimit, ErrorKind::ExternalServiceError] {
                let (calls, op) = flaky(failures, ClassifiedError::new(kind, "transient"));
                let outcome = retry(&RetryPolicy::default(), op).await;

                let expected = (failures + 1).min(3);
                assert_eq!(outcome.attempts, expected, "{} failures of {}", failures, kind);
                assert_eq!(calls.load(Ordering::SeqCst), expected);
                assert_eq!(outcome.is_success(), failures < 3);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let (calls, op) = flaky(5, ClassifiedError::new(ErrorKind::Authentication, "expired"));
        let start = Instant::now();
        let outcome = retry(&RetryPolicy::default(), op).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::Authentication);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_follow_backoff() {
        let (_, op) = flaky(10, ClassifiedError::external("boom"));
        let policy = RetryPolicy::default().with_max_attempts(4);
        let start = Instant::now();
        let outcome = retry(&policy, op).await;

        // 1s + 2s + 4s between four attempts
        assert_eq!(outcome.attempts, 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(7000));
        assert!(elapsed < Duration::from_millis(7050));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_uses_retry_after() {
        let limited = ClassifiedError::new(ErrorKind::RateLimit, "slow down")
            .with_upstream_status(429)
            .with_retry_after(Some(5));
        let (_, op) = flaky(1, limited);
        let start = Instant::now();
        let outcome = retry(&RetryPolicy::default(), op).await;

        assert_eq!(outcome.attempts, 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(5000));
        assert!(elapsed < Duration::from_millis(5050));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_is_surfaced() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = with_retry(&RetryPolicy::default(), || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(ClassifiedError::external(format!("failure #{}", n))) }
        })
        .await;

        assert_eq!(result.unwrap_err().message, "failure #3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_kind_restricted_policy() {
        let policy = RetryPolicy::default()
            .retry_on_kinds(&[ErrorKind::RateLimit, ErrorKind::ExternalServiceError]);

        let (calls, op) = flaky(5, ClassifiedError::new(ErrorKind::ServiceUnavailable, "down"));
        let outcome = retry(&policy, op).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let (calls, op) = flaky(1, ClassifiedError::external("boom"));
        let outcome = retry(&RetryPolicy::no_retry(), op).await;
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
