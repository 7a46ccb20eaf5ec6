//! Scheduler Policy
//!
//! Thresholds and timings for the scheduled-post sweep.

use pagepilot_core_resilience::{ErrorKind, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler operational policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerPolicy {
    /// Seconds between sweeps
    ///
    /// **Default:** 300 (5 minutes)
    pub scan_interval_s: u64,

    /// Maximum posts claimed per sweep
    ///
    /// **Default:** 10
    pub batch_size: usize,

    /// Seconds after which a post still in `processing` is considered
    /// abandoned by a crashed sweep
    ///
    /// **Default:** 900 (15 minutes)
    pub stale_processing_after_s: u64,

    /// Claims allowed before an interrupted post is given up on
    ///
    /// **Default:** 3
    pub max_claims: u32,

    /// Publish attempts per claim
    ///
    /// **Default:** 3
    pub max_publish_attempts: u32,

    /// **Default:** 1000
    pub initial_delay_ms: u64,

    /// **Default:** 2.0
    pub backoff_multiplier: f64,

    /// **Default:** 30000
    pub max_delay_ms: u64,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            scan_interval_s: 300,
            batch_size: 10,
            stale_processing_after_s: 900,
            max_claims: 3,
            max_publish_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl SchedulerPolicy {
    /// Validate the policy configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.scan_interval_s == 0 {
            return Err("scan_interval_s must be greater than 0".to_string());
        }

        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }

        if self.max_claims == 0 {
            return Err("max_claims must be at least 1".to_string());
        }

        if self.max_publish_attempts == 0 {
            return Err("max_publish_attempts must be at least 1".to_string());
        }

        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }

        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_s)
    }

    pub fn stale_processing_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_processing_after_s as i64)
    }

    /// Inner publish loop: retries only rate limits and upstream errors
    pub fn publish_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_publish_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .retry_on_kinds(&[ErrorKind::RateLimit, ErrorKind::ExternalServiceError])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepilot_core_resilience::ClassifiedError;

    #[test]
    fn test_default_policy() {
        let policy = SchedulerPolicy::default();

        assert_eq!(policy.scan_interval_s, 300);
        assert_eq!(policy.batch_size, 10);
        assert_eq!(policy.stale_processing_after_s, 900);
        assert_eq!(policy.max_claims, 3);
        assert_eq!(policy.max_publish_attempts, 3);

        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut policy = SchedulerPolicy::default();

        policy.batch_size = 0;
        assert!(policy.validate().is_err());
        policy.batch_size = 10;

        policy.scan_interval_s = 0;
        assert!(policy.validate().is_err());
        policy.scan_interval_s = 300;

        policy.max_publish_attempts = 0;
        assert!(policy.validate().is_err());
        policy.max_publish_attempts = 3;

        policy.backoff_multiplier = 0.5;
        assert!(policy.validate().is_err());
        policy.backoff_multiplier = f64::NAN;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_publish_retry_policy_kinds() {
        let retry = SchedulerPolicy::default().publish_retry_policy();

        assert_eq!(retry.max_attempts, 3);
        assert!(retry.is_retryable(&ClassifiedError::new(ErrorKind::RateLimit, "slow")));
        assert!(retry.is_retryable(&ClassifiedError::external("502")));
        assert!(!retry.is_retryable(&ClassifiedError::new(
            ErrorKind::ServiceUnavailable,
            "no response"
        )));
        assert!(!retry.is_retryable(&ClassifiedError::new(
            ErrorKind::Authentication,
            "expired"
        )));
    }

    #[test]
    fn test_deserialize_partial() {
        let policy: SchedulerPolicy = toml::from_str("batch_size = 25").unwrap();
        assert_eq!(policy.batch_size, 25);
        assert_eq!(policy.scan_interval_s, 300);
    }
}
