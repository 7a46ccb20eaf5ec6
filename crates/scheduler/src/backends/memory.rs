//! In-memory backend
//!
//! Single lock around all posts, so claims are trivially atomic.

use crate::{PageAccount, PostFilter, PostStats, PostStatus, PostStore, ScheduledPost};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagepilot_core_resilience::{ClassifiedError, ErrorKind, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    posts: RwLock<HashMap<String, ScheduledPost>>,
    accounts: RwLock<HashMap<String, PageAccount>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut posts: Vec<ScheduledPost>) -> Vec<ScheduledPost> {
    posts.sort_by(|a, b| {
        a.scheduled_for
            .cmp(&b.scheduled_for)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    posts
}

#[async_trait]
impl PostStore for InMemoryStore {
    async fn insert(&self, post: &ScheduledPost) -> Result<()> {
        let mut posts = self.posts.write().await;
        if posts.contains_key(&post.id) {
            return Err(ClassifiedError::new(
                ErrorKind::Conflict,
                "Duplicate entry for: id",
            ));
        }
        posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledPost>> {
        Ok(self.posts.read().await.get(id).cloned())
    }

    async fn find_due_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>> {
        let posts = self.posts.read().await;
        let due = posts.values().filter(|p| p.is_due(now)).cloned().collect();
        Ok(sorted(due).into_iter().take(limit).collect())
    }

    async fn save(&self, post: &ScheduledPost) -> Result<()> {
        let mut posts = self.posts.write().await;
        match posts.get_mut(&post.id) {
            Some(existing) => {
                *existing = post.clone();
                Ok(())
            }
            None => Err(ClassifiedError::not_found("Post not found")),
        }
    }

    async fn try_claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledPost>> {
        let mut posts = self.posts.write().await;
        match posts.get_mut(id) {
            Some(post) if post.status == PostStatus::Pending => {
                post.status = PostStatus::Processing;
                post.retry_count += 1;
                post.last_retry_at = Some(now);
                post.updated_at = now;
                Ok(Some(post.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cancel_pending(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut posts = self.posts.write().await;
        match posts.get_mut(id) {
            Some(post) if post.status == PostStatus::Pending => {
                post.status = PostStatus::Cancelled;
                post.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_stale_processing(&self, before: DateTime<Utc>) -> Result<Vec<ScheduledPost>> {
        let posts = self.posts.read().await;
        let stale = posts
            .values()
            .filter(|p| p.status == PostStatus::Processing)
            .filter(|p| p.last_retry_at.is_none_or(|at| at < before))
            .cloned()
            .collect();
        Ok(sorted(stale))
    }

    async fn list(&self, filter: &PostFilter) -> Result<Vec<ScheduledPost>> {
        let posts = self.posts.read().await;
        Ok(sorted(
            posts.values().filter(|p| filter.matches(p)).cloned().collect(),
        ))
    }

    async fn stats(&self) -> Result<PostStats> {
        let posts = self.posts.read().await;
        let mut stats = PostStats::default();
        for post in posts.values() {
            stats.record(post.status, 1);
        }
        Ok(stats)
    }

    async fn upsert_account(&self, account: &PageAccount) -> Result<()> {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn account(&self, id: &str) -> Result<Option<PageAccount>> {
        Ok(self.accounts.read().await.get(id).cloned())
    }
}
