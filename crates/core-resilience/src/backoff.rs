//! Exponential backoff schedule and the cooperative sleep used between attempts

use std::time::Duration;

/// Iterator over successive backoff delays
///
/// The base delay starts at `initial` and is multiplied by `multiplier`
/// after every step. Each yielded value is individually capped at `max`;
/// the cap never feeds back into the growth of the base delay.
///
/// ```
/// use pagepilot_core_resilience::backoff::BackoffSchedule;
/// use std::time::Duration;
///
/// let delays: Vec<u64> = BackoffSchedule::new(
///     Duration::from_millis(1000),
///     2.0,
///     Duration::from_millis(30_000),
/// )
/// .take(5)
/// .map(|d| d.as_millis() as u64)
/// .collect();
/// assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    base_ms: f64,
    multiplier: f64,
    max: Duration,
}

impl BackoffSchedule {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base_ms: initial.as_millis() as f64,
            multiplier,
            max,
        }
    }

    /// Uncapped delay that the next call to `next()` will be derived from
    pub fn current_base(&self) -> Duration {
        millis(self.base_ms)
    }

    /// Advance the base delay without yielding a value
    pub fn advance(&mut self) {
        self.base_ms *= self.multiplier;
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = millis(self.base_ms).min(self.max);
        self.advance();
        Some(delay)
    }
}

/// Wait to use before the next attempt
///
/// Rate-limit failures that carry an upstream retry hint wait for that
/// hint instead of the computed backoff. Either way the wait is capped at
/// `max`.
pub fn wait_before_retry(computed: Duration, retry_after_secs: Option<u64>, max: Duration) -> Duration {
    let wait = match retry_after_secs {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => computed,
    };
    wait.min(max)
}

/// Cooperative sleep on the tokio timer
pub async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

fn millis(ms: f64) -> Duration {
    if !ms.is_finite() || ms >= u64::MAX as f64 {
        return Duration::from_millis(u64::MAX);
    }
    Duration::from_millis(ms.max(0.0) as u64)
}
