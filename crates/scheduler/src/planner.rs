//! Auto-scheduling planner
//!
//! Turns high-scoring trends into pending posts: one content idea per trend,
//! spread across the account's preferred posting hours starting tomorrow.

use crate::clock::Clock;
use crate::{ContentType, NewPost, PostStore, ScheduledPost};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveTime, Utc};
use pagepilot_core_resilience::{ClassifiedError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Trends scoring below this are never auto-posted
pub const MIN_TREND_SCORE: u32 = 70;

pub const DEFAULT_PREFERRED_HOURS: [u32; 3] = [9, 14, 19];

/// Per-account autopilot configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutopilotSettings {
    pub auto_post_enabled: bool,
    pub posts_per_day: u32,
    /// Hours of day (UTC) to post at, cycled in order
    pub preferred_hours: Vec<u32>,
}

impl Default for AutopilotSettings {
    fn default() -> Self {
        Self {
            auto_post_enabled: false,
            posts_per_day: 1,
            preferred_hours: DEFAULT_PREFERRED_HOURS.to_vec(),
        }
    }
}

/// A researched trending topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub id: String,
    pub topic: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trend_score: u32,
    #[serde(default)]
    pub suggested_hashtags: Vec<String>,
    pub valid_until: DateTime<Utc>,
}

impl Trend {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.valid_until >= now
    }
}

/// One generated post idea
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentIdea {
    pub caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Predicted engagement score (1-100)
    #[serde(default)]
    pub expected_engagement: f64,
}

/// Produces post ideas for a topic (the LLM client in production)
#[async_trait]
pub trait IdeaSource: Send + Sync {
    async fn generate_ideas(&self, topic: &str, content_type: ContentType)
        -> Result<Vec<ContentIdea>>;
}

/// Valid trends scoring at least [`MIN_TREND_SCORE`], best first, at most `limit`
pub fn select_trends(trends: &[Trend], now: DateTime<Utc>, limit: usize) -> Vec<Trend> {
    let mut selected: Vec<Trend> = trends
        .iter()
        .filter(|t| t.is_valid(now) && t.trend_score >= MIN_TREND_SCORE)
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.trend_score.cmp(&a.trend_score));
    selected.truncate(limit);
    selected
}

/// Slot for the `index`-th auto post
///
/// Day offset is `1 + index / hours.len()` so the first slot is tomorrow;
/// the hour cycles through `preferred_hours`. Always after `now`.
pub fn next_post_time(preferred_hours: &[u32], index: usize, now: DateTime<Utc>) -> DateTime<Utc> {
    let hours: &[u32] = if preferred_hours.is_empty() {
        &DEFAULT_PREFERRED_HOURS
    } else {
        preferred_hours
    };

    let day_offset = 1 + (index / hours.len()) as u64;
    let hour = hours[index % hours.len()].min(23);

    let date = now
        .date_naive()
        .checked_add_days(Days::new(day_offset))
        .unwrap_or(now.date_naive());
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);

    date.and_time(time).and_utc()
}

pub struct AutoScheduler {
    store: Arc<dyn PostStore>,
    ideas: Arc<dyn IdeaSource>,
    clock: Arc<dyn Clock>,
}

impl AutoScheduler {
    pub fn new(store: Arc<dyn PostStore>, ideas: Arc<dyn IdeaSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ideas,
            clock,
        }
    }

    /// Schedule one post per selected trend for `account_id`
    ///
    /// Returns an empty list when autopilot is disabled. A trend whose idea
    /// generation fails is logged and skipped.
    pub async fn plan(
        &self,
        settings: &AutopilotSettings,
        account_id: &str,
        trends: &[Trend],
    ) -> Result<Vec<ScheduledPost>> {
        if !settings.auto_post_enabled {
            info!(account_id, "Autopilot disabled, nothing to plan");
            return Ok(Vec::new());
        }

        let Some(account) = self.store.account(account_id).await? else {
            return Err(ClassifiedError::not_found("Account not found"));
        };

        let now = self.clock.now();
        let selected = select_trends(trends, now, settings.posts_per_day as usize);
        let mut scheduled = Vec::with_capacity(selected.len());

        for (index, trend) in selected.iter().enumerate() {
            let ideas = match self.ideas.generate_ideas(&trend.topic, ContentType::Post).await {
                Ok(ideas) => ideas,
                Err(err) => {
                    warn!(
                        trend_id = %trend.id,
                        topic = %trend.topic,
                        error = %err.to_log_json(),
                        "Idea generation failed, skipping trend"
                    );
                    continue;
                }
            };

            let Some(idea) = ideas.into_iter().next() else {
                warn!(trend_id = %trend.id, "No ideas returned, skipping trend");
                continue;
            };

            let mut metadata = Map::new();
            metadata.insert("trendId".to_string(), Value::String(trend.id.clone()));
            metadata.insert(
                "predictedScore".to_string(),
                serde_json::Number::from_f64(idea.expected_engagement)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );

            let post = ScheduledPost::new(
                NewPost {
                    user_id: account.user_id.clone(),
                    facebook_account_id: account.id.clone(),
                    content: idea.caption,
                    content_type: ContentType::Post,
                    media_urls: Vec::new(),
                    hashtags: idea.hashtags,
                    scheduled_for: next_post_time(&settings.preferred_hours, index, now),
                    metadata,
                },
                now,
            );
            self.store.insert(&post).await?;
            scheduled.push(post);
        }

        info!(
            account_id,
            planned = scheduled.len(),
            "Auto-scheduled posts from trends"
        );
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::InMemoryStore;
    use crate::clock::ManualClock;
    use crate::{PageAccount, PostStatus};
    use chrono::{Duration, TimeZone, Timelike};
    use pagepilot_core_resilience::ErrorKind;

    fn trend(id: &str, score: u32, valid_until: DateTime<Utc>) -> Trend {
        Trend {
            id: id.into(),
            topic: format!("topic {}", id),
            category: "general".into(),
            description: None,
            trend_score: score,
            suggested_hashtags: vec![],
            valid_until,
        }
    }

    /// Fails for topics containing "broken"
    struct ScriptedIdeas;

    #[async_trait]
    impl IdeaSource for ScriptedIdeas {
        async fn generate_ideas(
            &self,
            topic: &str,
            _content_type: ContentType,
        ) -> Result<Vec<ContentIdea>> {
            if topic.contains("broken") {
                return Err(ClassifiedError::external("OpenAI service error (503)"));
            }
            Ok(vec![ContentIdea {
                caption: format!("All about {}", topic),
                hashtags: vec!["trending".into()],
                expected_engagement: 82.0,
            }])
        }
    }

    #[test]
    fn test_next_post_time_cycles_hours() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 22, 30, 0).unwrap();
        let hours = [9, 14, 19];

        let slots: Vec<_> = (0..4).map(|i| next_post_time(&hours, i, now)).collect();
        assert_eq!(slots[0], Utc.with_ymd_and_hms(2024, 6, 11, 9, 0, 0).unwrap());
        assert_eq!(slots[1], Utc.with_ymd_and_hms(2024, 6, 11, 14, 0, 0).unwrap());
        assert_eq!(slots[2], Utc.with_ymd_and_hms(2024, 6, 11, 19, 0, 0).unwrap());
        assert_eq!(slots[3], Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_post_time_is_always_future() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap();
        for index in 0..10 {
            let slot = next_post_time(&[0], index, now);
            assert!(slot > now);
            assert_eq!(slot.minute(), 0);
            assert_eq!(slot.second(), 0);
        }
        assert!(next_post_time(&[], 0, now) > now);
    }

    #[test]
    fn test_select_trends() {
        let now = Utc::now();
        let later = now + Duration::days(7);
        let trends = vec![
            trend("low", 50, later),
            trend("mid", 75, later),
            trend("top", 95, later),
            trend("expired", 99, now - Duration::days(1)),
            trend("edge", 70, later),
        ];

        let ids: Vec<_> = select_trends(&trends, now, 10)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["top", "mid", "edge"]);

        assert_eq!(select_trends(&trends, now, 1)[0].id, "top");
    }

    #[tokio::test]
    async fn test_plan_schedules_one_post_per_trend() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_account(&PageAccount {
                id: "acct-1".into(),
                user_id: "user-1".into(),
                page_id: Some("1001".into()),
                page_name: None,
                page_access_token: Some("EAAB".into()),
            })
            .await
            .unwrap();

        let planner = AutoScheduler::new(
            store.clone(),
            Arc::new(ScriptedIdeas),
            Arc::new(ManualClock::new(now)),
        );
        let settings = AutopilotSettings {
            auto_post_enabled: true,
            posts_per_day: 3,
            preferred_hours: vec![9, 14, 19],
        };
        let later = now + Duration::days(7);
        let trends = vec![
            trend("a", 90, later),
            trend("broken", 85, later),
            trend("c", 80, later),
        ];

        let posts = planner.plan(&settings, "acct-1", &trends).await.unwrap();
        assert_eq!(posts.len(), 2);

        assert_eq!(posts[0].status, PostStatus::Pending);
        assert_eq!(posts[0].user_id, "user-1");
        assert_eq!(posts[0].metadata["trendId"], "a");
        assert_eq!(posts[0].metadata["predictedScore"], 82.0);
        assert_eq!(
            posts[0].scheduled_for,
            Utc.with_ymd_and_hms(2024, 6, 11, 9, 0, 0).unwrap()
        );

        // The failed trend keeps its slot index
        assert_eq!(posts[1].metadata["trendId"], "c");
        assert_eq!(
            posts[1].scheduled_for,
            Utc.with_ymd_and_hms(2024, 6, 11, 19, 0, 0).unwrap()
        );

        assert_eq!(store.stats().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_plan_disabled_or_unknown_account() {
        let store = Arc::new(InMemoryStore::new());
        let planner = AutoScheduler::new(
            store,
            Arc::new(ScriptedIdeas),
            Arc::new(ManualClock::new(Utc::now())),
        );

        let disabled = AutopilotSettings::default();
        assert!(planner.plan(&disabled, "acct-1", &[]).await.unwrap().is_empty());

        let enabled = AutopilotSettings {
            auto_post_enabled: true,
            ..Default::default()
        };
        let err = planner.plan(&enabled, "acct-1", &[]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
