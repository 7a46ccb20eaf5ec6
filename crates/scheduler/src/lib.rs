//! PagePilot Scheduler: Persistent State Machine for Scheduled Posts
//!
//! # Overview
//!
//! Users (or the auto-scheduling planner) create posts in `pending` with a
//! `scheduled_for` timestamp. A periodic sweep claims the ones that are due,
//! publishes them to the page through a [`Publisher`], and records the
//! terminal outcome.
//!
//! # Features
//!
//! - **Atomic Claims**: `pending → processing` is a compare-and-set, so a
//!   post is never claimed by two overlapping sweeps
//! - **Bounded Retries**: publishing retries only on rate limits and
//!   upstream service errors, with exponential backoff
//! - **Crash Reconciliation**: posts stuck in `processing` are re-queued or
//!   abandoned before each sweep
//! - **Multiple Backends**: SQLite (default) and an in-memory store
//!
//! # State Machine
//!
//! ```text
//!   pending ──claim──> processing ──publish ok──> published
//!      │                    │
//!      │                    └──retries exhausted──> failed
//!      │
//!      └──user cancel──> cancelled
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pagepilot_scheduler::{Scheduler, SchedulerPolicy, SystemClock};
//! use std::sync::Arc;
//!
//! # async fn example(publisher: Arc<dyn pagepilot_scheduler::Publisher>)
//! #     -> pagepilot_core_resilience::Result<()> {
//! let store = Arc::new(pagepilot_scheduler::SqliteStore::open("pagepilot.db").await?);
//! let scheduler = Arc::new(Scheduler::new(
//!     store,
//!     publisher,
//!     Arc::new(SystemClock),
//!     SchedulerPolicy::default(),
//! )?);
//!
//! let stats = scheduler.run_sweep().await;
//! println!("{}", stats.summary());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagepilot_core_resilience::{ClassifiedError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub mod backends;
pub mod clock;
pub mod daemon;
pub mod executor;
pub mod metrics;
pub mod planner;
pub mod policy;
pub mod publisher;
pub mod service;

pub use backends::memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use backends::sqlite::SqliteStore;

pub use clock::{Clock, ManualClock, SystemClock};
pub use daemon::Scheduler;
pub use executor::{PostExecutor, PostOutcome};
pub use metrics::SweepStats;
pub use planner::{AutoScheduler, AutopilotSettings, ContentIdea, IdeaSource, Trend};
pub use policy::SchedulerPolicy;
pub use publisher::{PostContent, PublishReceipt, Publisher};
pub use service::PostService;

/// Scheduled post status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Waiting for its scheduled time
    Pending,
    /// Claimed by a sweep; held only during a publish attempt
    Processing,
    /// Published to the page
    Published,
    /// Publishing failed terminally
    Failed,
    /// Cancelled by the user while still pending
    Cancelled,
}

impl PostStatus {
    pub const ALL: [PostStatus; 5] = [
        PostStatus::Pending,
        PostStatus::Processing,
        PostStatus::Published,
        PostStatus::Failed,
        PostStatus::Cancelled,
    ];

    /// No automatic transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PostStatus::Published | PostStatus::Failed | PostStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Processing => "processing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = ClassifiedError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PostStatus::Pending),
            "processing" => Ok(PostStatus::Processing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            "cancelled" => Ok(PostStatus::Cancelled),
            _ => Err(ClassifiedError::validation(format!(
                "Invalid post status: {}",
                s
            ))),
        }
    }
}

/// Kind of content being published
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Post,
    Video,
    Reel,
    Story,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentType::Post => "post",
            ContentType::Video => "video",
            ContentType::Reel => "reel",
            ContentType::Story => "story",
        };
        f.write_str(s)
    }
}

impl FromStr for ContentType {
    type Err = ClassifiedError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "post" => Ok(ContentType::Post),
            "video" => Ok(ContentType::Video),
            "reel" => Ok(ContentType::Reel),
            "story" => Ok(ContentType::Story),
            _ => Err(ClassifiedError::validation(format!(
                "Invalid content type: {}",
                s
            ))),
        }
    }
}

/// A post waiting to be (or already) published to a page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    pub facebook_account_id: String,
    pub content: String,
    pub content_type: ContentType,
    pub media_urls: Vec<String>,
    pub hashtags: Vec<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: PostStatus,
    /// Id returned by the platform; set only on success
    pub published_content_id: Option<String>,
    /// Set only on terminal failure
    pub error_message: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Number of times a sweep has claimed this post
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    /// Diagnostics; merged additively, never replaced wholesale
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledPost {
    /// Create a pending post from a request
    pub fn new(request: NewPost, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id,
            facebook_account_id: request.facebook_account_id,
            content: request.content,
            content_type: request.content_type,
            media_urls: request.media_urls,
            hashtags: request.hashtags,
            scheduled_for: request.scheduled_for,
            status: PostStatus::Pending,
            published_content_id: None,
            error_message: None,
            published_at: None,
            retry_count: 0,
            last_retry_at: None,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending and scheduled at or before `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Pending && self.scheduled_for <= now
    }

    /// Insert `entries` into the metadata map, keeping unrelated keys
    pub fn merge_metadata<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.metadata.extend(entries);
    }

    pub fn mark_published(&mut self, content_id: String, now: DateTime<Utc>) {
        self.status = PostStatus::Published;
        self.published_content_id = Some(content_id);
        self.published_at = Some(now);
        self.updated_at = now;
    }

    /// Record a terminal failure along with diagnostics
    ///
    /// `attempts` counts inner publish attempts.
    pub fn mark_failed(&mut self, err: &ClassifiedError, attempts: u32, now: DateTime<Utc>) {
        self.fail_with(err, ("attempts", attempts), now);
    }

    /// Give up on a post whose claims kept being interrupted
    ///
    /// `claims` is the number of times a sweep claimed it.
    pub fn mark_abandoned(&mut self, err: &ClassifiedError, claims: u32, now: DateTime<Utc>) {
        self.fail_with(err, ("claims", claims), now);
    }

    fn fail_with(&mut self, err: &ClassifiedError, count: (&str, u32), now: DateTime<Utc>) {
        self.status = PostStatus::Failed;
        self.error_message = Some(err.message.clone());
        self.merge_metadata([
            ("failedAt".to_string(), Value::String(now.to_rfc3339())),
            (count.0.to_string(), Value::from(count.1)),
            ("errorKind".to_string(), Value::String(err.kind.to_string())),
        ]);
        self.updated_at = now;
    }

    /// Hand a claimed post back to the sweep
    pub fn release(&mut self, now: DateTime<Utc>) {
        self.status = PostStatus::Pending;
        self.updated_at = now;
    }
}

/// Request to schedule a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub user_id: String,
    pub facebook_account_id: String,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A connected Facebook page
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageAccount {
    pub id: String,
    pub user_id: String,
    pub page_id: Option<String>,
    pub page_name: Option<String>,
    pub page_access_token: Option<String>,
}

impl PageAccount {
    /// Publishing credential, if the account is fully configured
    pub fn credential(&self) -> Option<PageCredential> {
        let page_id = self.page_id.as_deref().filter(|s| !s.is_empty())?;
        let token = self.page_access_token.as_deref().filter(|s| !s.is_empty())?;
        Some(PageCredential {
            page_id: page_id.to_string(),
            access_token: token.to_string(),
        })
    }
}

impl fmt::Debug for PageAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageAccount")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("page_id", &self.page_id)
            .field("page_name", &self.page_name)
            .field(
                "page_access_token",
                &self.page_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Page id and access token used to publish
#[derive(Clone, PartialEq, Eq)]
pub struct PageCredential {
    pub page_id: String,
    pub access_token: String,
}

impl fmt::Debug for PageCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCredential")
            .field("page_id", &self.page_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Filter for [`PostStore::list`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub account_id: Option<String>,
    pub user_id: Option<String>,
}

impl PostFilter {
    pub fn matches(&self, post: &ScheduledPost) -> bool {
        self.status.is_none_or(|s| s == post.status)
            && self
                .account_id
                .as_deref()
                .is_none_or(|a| a == post.facebook_account_id)
            && self.user_id.as_deref().is_none_or(|u| u == post.user_id)
    }
}

/// Core trait for scheduled-post storage backends
///
/// Every failure is already classified. Implementations must make
/// [`PostStore::try_claim`] atomic.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a new post
    async fn insert(&self, post: &ScheduledPost) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<ScheduledPost>>;

    /// Pending posts with `scheduled_for <= now`, oldest first, at most `limit`
    async fn find_due_pending(&self, now: DateTime<Utc>, limit: usize)
        -> Result<Vec<ScheduledPost>>;

    /// Overwrite a post's mutable fields
    ///
    /// Returns a `NotFound` failure when the post does not exist.
    async fn save(&self, post: &ScheduledPost) -> Result<()>;

    /// Atomically move a pending post to processing
    ///
    /// Increments `retry_count` and stamps `last_retry_at`. Returns `None`
    /// if the post is missing or no longer pending.
    async fn try_claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledPost>>;

    /// Cancel a post only if it is still pending
    async fn cancel_pending(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Posts in processing whose last claim happened before `before`
    async fn find_stale_processing(&self, before: DateTime<Utc>) -> Result<Vec<ScheduledPost>>;

    /// Posts matching `filter`, ordered by `scheduled_for`
    async fn list(&self, filter: &PostFilter) -> Result<Vec<ScheduledPost>>;

    async fn stats(&self) -> Result<PostStats>;

    async fn upsert_account(&self, account: &PageAccount) -> Result<()>;

    async fn account(&self, id: &str) -> Result<Option<PageAccount>>;

    /// Publishing credential for an account, if fully configured
    async fn page_credentials(&self, account_id: &str) -> Result<Option<PageCredential>> {
        Ok(self
            .account(account_id)
            .await?
            .and_then(|account| account.credential()))
    }
}

/// Post counts per status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostStats {
    pub pending: u64,
    pub processing: u64,
    pub published: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl PostStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.published + self.failed + self.cancelled
    }

    pub fn record(&mut self, status: PostStatus, count: u64) {
        match status {
            PostStatus::Pending => self.pending += count,
            PostStatus::Processing => self.processing += count,
            PostStatus::Published => self.published += count,
            PostStatus::Failed => self.failed += count,
            PostStatus::Cancelled => self.cancelled += count,
        }
    }

    /// Published share of posts that reached a publish outcome
    pub fn success_rate(&self) -> f64 {
        let settled = self.published + self.failed;
        if settled == 0 {
            1.0
        } else {
            self.published as f64 / settled as f64
        }
    }
}
