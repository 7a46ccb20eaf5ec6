//! Per-post state machine
//!
//! Claims one post, publishes it through the retry executor, and records
//! the terminal outcome. Failures to record the outcome are logged here and
//! never propagate, so one bad post cannot abort a sweep.

use crate::clock::Clock;
use crate::publisher::{PostContent, Publisher};
use crate::{PostStore, ScheduledPost};
use pagepilot_core_resilience::{retry, ClassifiedError, ErrorKind, Result, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to a post handed to the executor
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// Published; `attempts` counts inner publish attempts
    Published { content_id: String, attempts: u32 },
    /// Ended in `failed`
    Failed {
        kind: ErrorKind,
        message: String,
        attempts: u32,
    },
    /// No longer pending when we tried to claim it
    Skipped,
}

pub struct PostExecutor {
    store: Arc<dyn PostStore>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
}

impl PostExecutor {
    pub fn new(
        store: Arc<dyn PostStore>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            retry_policy,
        }
    }

    /// Claim and publish a single post
    ///
    /// Returns `Err` when the claim could not be made, or when the page
    /// credentials could not be read. In the latter case the post is handed
    /// back to `pending` so a later sweep picks it up again. Every publish
    /// failure is recorded on the post.
    pub async fn execute(&self, post_id: &str) -> Result<PostOutcome> {
        let Some(post) = self.store.try_claim(post_id, self.clock.now()).await? else {
            debug!(post_id, "Post no longer pending, skipping");
            return Ok(PostOutcome::Skipped);
        };

        debug!(
            post_id,
            retry_count = post.retry_count,
            "Claimed post for publishing"
        );

        let credential = match self.store.page_credentials(&post.facebook_account_id).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                let err = ClassifiedError::validation("Account not properly configured")
                    .with_context("postId", post.id.clone())
                    .with_context("facebookAccountId", post.facebook_account_id.clone());
                return Ok(self.fail(post, err, 0).await);
            }
            Err(err) => {
                self.release(post, &err).await;
                return Err(err);
            }
        };

        let content = PostContent::from_post(&post);
        let publisher = &self.publisher;
        let outcome = retry(&self.retry_policy, || publisher.publish(&credential, &content)).await;
        let attempts = outcome.attempts;

        match outcome.result {
            Ok(receipt) => Ok(self.succeed(post, receipt.external_id, attempts).await),
            Err(err) => Ok(self.fail(post, err, attempts).await),
        }
    }

    async fn succeed(&self, mut post: ScheduledPost, content_id: String, attempts: u32) -> PostOutcome {
        post.mark_published(content_id.clone(), self.clock.now());

        // The content is live; a failed save must not turn it into a failure
        if let Err(save_err) = self.store.save(&post).await {
            error!(
                post_id = %post.id,
                content_id = %content_id,
                error = %save_err.to_log_json(),
                "Published post but failed to record it"
            );
        } else {
            info!(
                post_id = %post.id,
                content_id = %content_id,
                attempts,
                "Published scheduled post"
            );
        }

        PostOutcome::Published {
            content_id,
            attempts,
        }
    }

    /// Return a claimed post to `pending` without touching its outcome
    ///
    /// If this save fails too, the post stays in `processing` until stale
    /// reconciliation requeues it.
    async fn release(&self, mut post: ScheduledPost, cause: &ClassifiedError) {
        warn!(
            post_id = %post.id,
            error = %cause.to_log_json(),
            "Could not read page credentials, returning post to pending"
        );

        post.release(self.clock.now());

        if let Err(save_err) = self.store.save(&post).await {
            error!(
                post_id = %post.id,
                save_error = %save_err.to_log_json(),
                cause = %cause.to_log_json(),
                "Failed to return post to pending"
            );
        }
    }

    async fn fail(&self, mut post: ScheduledPost, err: ClassifiedError, attempts: u32) -> PostOutcome {
        warn!(
            post_id = %post.id,
            attempts,
            error = %err.to_log_json(),
            "Failed to publish post"
        );

        post.mark_failed(&err, attempts, self.clock.now());

        if let Err(save_err) = self.store.save(&post).await {
            error!(
                post_id = %post.id,
                save_error = %save_err.to_log_json(),
                publish_error = %err.to_log_json(),
                "Failed to record post failure"
            );
        }

        PostOutcome::Failed {
            kind: err.kind,
            message: err.message,
            attempts,
        }
    }
}
