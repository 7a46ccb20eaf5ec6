//! User-facing post operations: schedule and cancel

use crate::clock::Clock;
use crate::{NewPost, PostFilter, PostStatus, PostStore, ScheduledPost};
use pagepilot_core_resilience::{ClassifiedError, Result};
use std::sync::Arc;
use tracing::info;

pub struct PostService {
    store: Arc<dyn PostStore>,
    clock: Arc<dyn Clock>,
}

impl PostService {
    pub fn new(store: Arc<dyn PostStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a pending post for one of the user's accounts
    pub async fn schedule(&self, request: NewPost) -> Result<ScheduledPost> {
        if request.content.trim().is_empty() {
            return Err(ClassifiedError::validation("Content is required"));
        }

        let account = self.store.account(&request.facebook_account_id).await?;
        match account {
            Some(account) if account.user_id == request.user_id => {}
            _ => return Err(ClassifiedError::not_found("Account not found")),
        }

        let post = ScheduledPost::new(request, self.clock.now());
        self.store.insert(&post).await?;

        info!(
            post_id = %post.id,
            account_id = %post.facebook_account_id,
            scheduled_for = %post.scheduled_for,
            "Scheduled post"
        );
        Ok(post)
    }

    /// Cancel a post that is still pending
    pub async fn cancel(&self, post_id: &str) -> Result<ScheduledPost> {
        let Some(mut post) = self.store.get(post_id).await? else {
            return Err(ClassifiedError::not_found("Post not found"));
        };

        let now = self.clock.now();
        // cancel_pending re-checks the status atomically
        if post.status != PostStatus::Pending || !self.store.cancel_pending(post_id, now).await? {
            return Err(
                ClassifiedError::validation("Cannot cancel post with current status")
                    .with_context("status", post.status.to_string()),
            );
        }

        post.status = PostStatus::Cancelled;
        post.updated_at = now;
        info!(post_id, "Cancelled scheduled post");
        Ok(post)
    }

    pub async fn list(&self, filter: &PostFilter) -> Result<Vec<ScheduledPost>> {
        self.store.list(filter).await
    }
}
