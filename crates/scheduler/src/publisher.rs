//! Boundary to the external platform that receives published posts

use crate::{ContentType, PageCredential, ScheduledPost};
use async_trait::async_trait;
use pagepilot_core_resilience::Result;
use serde::{Deserialize, Serialize};

/// What gets sent to the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostContent {
    pub message: String,
    pub content_type: ContentType,
    pub media_urls: Vec<String>,
}

impl PostContent {
    /// Caption followed by the post's hashtags
    pub fn from_post(post: &ScheduledPost) -> Self {
        let tags: Vec<String> = post
            .hashtags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| {
                if t.starts_with('#') {
                    t.to_string()
                } else {
                    format!("#{}", t)
                }
            })
            .collect();

        let message = if tags.is_empty() {
            post.content.clone()
        } else {
            format!("{}\n\n{}", post.content, tags.join(" "))
        };

        Self {
            message,
            content_type: post.content_type,
            media_urls: post.media_urls.clone(),
        }
    }

    pub fn primary_media(&self) -> Option<&str> {
        self.media_urls.first().map(String::as_str)
    }
}

/// Platform acknowledgement of a published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub external_id: String,
}

/// Publishes content to a page
///
/// Implementations classify their own failures; a rate-limited response
/// must come back as a `RateLimit` failure carrying the upstream hint.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        credential: &PageCredential,
        content: &PostContent,
    ) -> Result<PublishReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewPost;
    use chrono::Utc;

    fn post_with_tags(tags: &[&str]) -> ScheduledPost {
        ScheduledPost::new(
            NewPost {
                user_id: "u".into(),
                facebook_account_id: "a".into(),
                content: "Spring sale starts today".into(),
                content_type: ContentType::Post,
                media_urls: vec!["https://cdn.example.com/a.jpg".into()],
                hashtags: tags.iter().map(|t| t.to_string()).collect(),
                scheduled_for: Utc::now(),
                metadata: Default::default(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_message_without_hashtags() {
        let content = PostContent::from_post(&post_with_tags(&[]));
        assert_eq!(content.message, "Spring sale starts today");
        assert_eq!(content.primary_media(), Some("https://cdn.example.com/a.jpg"));
    }

    #[test]
    fn test_hashtags_are_appended_once() {
        let content = PostContent::from_post(&post_with_tags(&["sale", "#spring", " "]));
        assert_eq!(content.message, "Spring sale starts today\n\n#sale #spring");
    }
}
