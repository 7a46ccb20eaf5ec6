//! Scheduler Daemon: the periodic sweep
//!
//! Each tick reconciles posts left in `processing` by an interrupted sweep,
//! then claims and publishes the due batch one post at a time.

use crate::clock::Clock;
use crate::executor::{PostExecutor, PostOutcome};
use crate::metrics::{SweepStats, SweepStatsBuilder};
use crate::policy::SchedulerPolicy;
use crate::publisher::Publisher;
use crate::PostStore;
use pagepilot_core_resilience::{ClassifiedError, ErrorKind, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Message recorded on posts abandoned after repeated interrupted claims
pub const ABANDONED_MESSAGE: &str = "Abandoned after repeated interrupted attempts";

/// The scheduled-post sweeper
pub struct Scheduler {
    store: Arc<dyn PostStore>,
    executor: PostExecutor,
    clock: Arc<dyn Clock>,
    policy: SchedulerPolicy,

    /// Set while a sweep is in flight; ticks that find it set are skipped
    sweeping: AtomicBool,
}

/// Clears the in-flight flag even if the sweep future is dropped
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    /// Create a scheduler; rejects an invalid policy
    pub fn new(
        store: Arc<dyn PostStore>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        policy: SchedulerPolicy,
    ) -> Result<Self> {
        policy.validate().map_err(|e| {
            ClassifiedError::validation(format!("Invalid scheduler policy: {}", e))
        })?;

        let executor = PostExecutor::new(
            store.clone(),
            publisher,
            clock.clone(),
            policy.publish_retry_policy(),
        );

        Ok(Self {
            store,
            executor,
            clock,
            policy,
            sweeping: AtomicBool::new(false),
        })
    }

    pub fn policy(&self) -> &SchedulerPolicy {
        &self.policy
    }

    /// Main event loop - runs forever
    ///
    /// Sweeps run on their own task so a slow sweep never delays the timer;
    /// a tick that arrives while one is still running is skipped.
    ///
    /// ```no_run
    /// # use pagepilot_scheduler::Scheduler;
    /// # use std::sync::Arc;
    /// # fn example(scheduler: Arc<Scheduler>) {
    /// tokio::spawn(async move {
    ///     scheduler.run().await;
    /// });
    /// # }
    /// ```
    pub async fn run(self: Arc<Self>) {
        info!(
            scan_interval_s = self.policy.scan_interval_s,
            batch_size = self.policy.batch_size,
            max_publish_attempts = self.policy.max_publish_attempts,
            "Scheduled posts job started (runs every {}s)",
            self.policy.scan_interval_s
        );

        let mut interval = tokio::time::interval(self.policy.scan_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            if self.is_sweeping() {
                warn!("Previous sweep still running, skipping this tick");
                continue;
            }

            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.try_sweep().await;
            });
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    /// Run a sweep unless one is already in flight
    pub async fn try_sweep(&self) -> Option<SweepStats> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let _guard = SweepGuard(&self.sweeping);
        Some(self.sweep().await)
    }

    /// Execute a single sweep regardless of the overlap flag
    ///
    /// Used by the CLI and integration tests. Claims stay atomic either way.
    pub async fn run_sweep(&self) -> SweepStats {
        self.sweep().await
    }

    async fn sweep(&self) -> SweepStats {
        info!("Checking for scheduled posts to publish...");
        let mut stats = SweepStatsBuilder::new();

        self.reconcile_stale(&mut stats).await;

        let now = self.clock.now();
        let due = match self.store.find_due_pending(now, self.policy.batch_size).await {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err.to_log_json(), "Scheduled posts job error");
                return stats.finish();
            }
        };
        stats.record_due(due.len());

        // Sequential: one post's retry loop completes before the next begins
        for post in due {
            match self.executor.execute(&post.id).await {
                Ok(PostOutcome::Published { .. }) => stats.record_published(),
                Ok(PostOutcome::Failed { .. }) => stats.record_failed(),
                Ok(PostOutcome::Skipped) => stats.record_skipped(),
                Err(err) => {
                    stats.record_error();
                    error!(
                        post_id = %post.id,
                        error = %err.to_log_json(),
                        "Failed to process scheduled post"
                    );
                }
            }
        }

        let stats = stats.finish();
        info!("{}", stats.summary());
        stats
    }

    /// Return interrupted `processing` posts to `pending`, or give up on them
    async fn reconcile_stale(&self, stats: &mut SweepStatsBuilder) {
        let now = self.clock.now();
        let cutoff = now - self.policy.stale_processing_after();

        let stale = match self.store.find_stale_processing(cutoff).await {
            Ok(stale) => stale,
            Err(err) => {
                error!(error = %err.to_log_json(), "Failed to look up stale posts");
                return;
            }
        };

        for mut post in stale {
            if post.retry_count < self.policy.max_claims {
                post.release(now);
                match self.store.save(&post).await {
                    Ok(()) => {
                        stats.record_requeued();
                        warn!(
                            post_id = %post.id,
                            retry_count = post.retry_count,
                            "Requeued post left in processing"
                        );
                    }
                    Err(err) => error!(
                        post_id = %post.id,
                        error = %err.to_log_json(),
                        "Failed to requeue stale post"
                    ),
                }
            } else {
                let err = ClassifiedError::new(ErrorKind::Unknown, ABANDONED_MESSAGE);
                post.mark_abandoned(&err, post.retry_count, now);
                match self.store.save(&post).await {
                    Ok(()) => {
                        stats.record_abandoned();
                        error!(
                            post_id = %post.id,
                            retry_count = post.retry_count,
                            "Abandoned post after repeated interrupted attempts"
                        );
                    }
                    Err(save_err) => error!(
                        post_id = %post.id,
                        error = %save_err.to_log_json(),
                        "Failed to record abandoned post"
                    ),
                }
            }
        }
    }
}
