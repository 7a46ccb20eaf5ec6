//! Sweep Metrics
//!
//! Tracks what a single sweep did with the posts it found.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Statistics from a single sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SweepStats {
    /// Due pending posts returned by the store
    pub due: usize,

    /// Posts published during this sweep
    pub published: usize,

    /// Posts that ended in `failed`
    pub failed: usize,

    /// Posts another sweep claimed first
    pub skipped: usize,

    /// Posts whose processing hit a store error before an outcome
    pub errors: usize,

    /// Stale `processing` posts returned to `pending`
    pub requeued: usize,

    /// Stale `processing` posts given up on
    pub abandoned: usize,

    /// Wall time of the sweep in milliseconds
    pub duration_ms: Option<u64>,
}

impl SweepStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts that reached a publish outcome
    pub fn processed(&self) -> usize {
        self.published + self.failed
    }

    /// Published share of processed posts (1.0 when nothing was processed)
    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            1.0
        } else {
            self.published as f64 / processed as f64
        }
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Sweep: {} due | {} published | {} failed | {} skipped | {} errors | Reconciled: {} requeued, {} abandoned ({:.1}% success)",
            self.due,
            self.published,
            self.failed,
            self.skipped,
            self.errors,
            self.requeued,
            self.abandoned,
            self.success_rate() * 100.0
        )
    }
}

/// Builder for tracking sweep progress
#[derive(Debug, Clone)]
pub struct SweepStatsBuilder {
    stats: SweepStats,
    start_time: Instant,
}

impl SweepStatsBuilder {
    pub fn new() -> Self {
        Self {
            stats: SweepStats::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record_due(&mut self, count: usize) {
        self.stats.due += count;
    }

    pub fn record_published(&mut self) {
        self.stats.published += 1;
    }

    pub fn record_failed(&mut self) {
        self.stats.failed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.stats.skipped += 1;
    }

    pub fn record_error(&mut self) {
        self.stats.errors += 1;
    }

    pub fn record_requeued(&mut self) {
        self.stats.requeued += 1;
    }

    pub fn record_abandoned(&mut self) {
        self.stats.abandoned += 1;
    }

    /// Finalize and return the stats
    pub fn finish(mut self) -> SweepStats {
        self.stats.duration_ms = Some(self.start_time.elapsed().as_millis() as u64);
        self.stats
    }

    pub fn stats(&self) -> &SweepStats {
        &self.stats
    }
}

impl Default for SweepStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut stats = SweepStats::new();
        assert_eq!(stats.success_rate(), 1.0);

        stats.published = 3;
        stats.failed = 1;
        assert_eq!(stats.success_rate(), 0.75);
    }

    #[test]
    fn test_stats_builder() {
        let mut builder = SweepStatsBuilder::new();

        builder.record_due(4);
        builder.record_published();
        builder.record_published();
        builder.record_failed();
        builder.record_skipped();
        builder.record_requeued();
        assert_eq!(builder.stats().published, 2);

        let stats = builder.finish();

        assert_eq!(stats.due, 4);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.abandoned, 0);
        assert!(stats.duration_ms.is_some());
    }

    #[test]
    fn test_summary() {
        let stats = SweepStats {
            due: 5,
            published: 3,
            failed: 1,
            skipped: 1,
            errors: 0,
            requeued: 2,
            abandoned: 1,
            duration_ms: Some(12),
        };

        let summary = stats.summary();
        assert!(summary.contains("5 due"));
        assert!(summary.contains("3 published"));
        assert!(summary.contains("1 failed"));
        assert!(summary.contains("2 requeued"));
        assert!(summary.contains("75.0% success"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(SweepStats::new()).unwrap();
        assert_eq!(json["due"], 0);
        assert!(json.get("durationMs").is_some());
    }
}
