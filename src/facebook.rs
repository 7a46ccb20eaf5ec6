/*!
 * Facebook Graph API publisher
 *
 * Text posts go to `/{page_id}/feed`; posts with media go to
 * `/{page_id}/photos` with the first media URL. Every failure is classified
 * before it leaves this module, so the executor only ever sees
 * `ClassifiedError`s.
 */

use crate::config::FacebookConfig;
use crate::http;
use async_trait::async_trait;
use pagepilot_core_resilience::{
    classify, ClassifiedError, HttpFailure, Lifecycle, RawFailure, Result,
};
use pagepilot_scheduler::{PageCredential, PostContent, PublishReceipt, Publisher};
use serde::Deserialize;
use tracing::{debug, info};

pub const SERVICE_NAME: &str = "Facebook";

/// Graph response for a created post or photo
#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: Option<String>,
    /// Photos report the feed story id separately
    post_id: Option<String>,
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(config: &FacebookConfig) -> Result<Self> {
        let http = http::build_client(config.timeout()).map_err(fail)?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint and form parameters for `content`
    fn request_for(
        &self,
        credential: &PageCredential,
        content: &PostContent,
    ) -> (String, Vec<(&'static str, String)>) {
        let mut params = vec![
            ("message", content.message.clone()),
            ("access_token", credential.access_token.clone()),
        ];

        let edge = match content.primary_media() {
            Some(url) => {
                params.push(("url", url.to_string()));
                "photos"
            }
            None => "feed",
        };

        (
            format!("{}/{}/{}", self.base_url, credential.page_id, edge),
            params,
        )
    }
}

fn fail(failure: HttpFailure) -> ClassifiedError {
    classify(RawFailure::http(SERVICE_NAME, failure))
}

#[async_trait]
impl Publisher for GraphClient {
    async fn publish(
        &self,
        credential: &PageCredential,
        content: &PostContent,
    ) -> Result<PublishReceipt> {
        let (url, params) = self.request_for(credential, content);
        debug!(page_id = %credential.page_id, url = %url, "Publishing to Graph API");

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| fail(http::transport_failure(&e)))?;

        let status = response.status();
        let retry_after = http::retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| fail(http::transport_failure(&e)))?;

        if !status.is_success() {
            return Err(fail(HttpFailure::Response {
                status: status.as_u16(),
                retry_after,
                message: http::error_message(&body),
            }));
        }

        let created: CreatedObject = serde_json::from_str(&body).map_err(|e| {
            ClassifiedError::external(format!("{} returned an unreadable response", SERVICE_NAME))
                .with_context("service", SERVICE_NAME)
                .with_context("reason", e.to_string())
        })?;

        let external_id = created.post_id.or(created.id).ok_or_else(|| {
            ClassifiedError::external(format!("{} response did not include a post id", SERVICE_NAME))
                .with_context("service", SERVICE_NAME)
        })?;

        info!(page_id = %credential.page_id, external_id = %external_id, "Published to page");
        Ok(PublishReceipt { external_id })
    }
}

#[async_trait]
impl Lifecycle for GraphClient {
    fn name(&self) -> &str {
        "facebook"
    }

    async fn connect(&self) -> Result<()> {
        self.health_check().await
    }

    /// Reachability only: any HTTP answer counts, since no token is sent
    async fn health_check(&self) -> Result<()> {
        self.http
            .get(&self.base_url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| fail(http::transport_failure(&e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepilot_scheduler::ContentType;

    fn client() -> GraphClient {
        GraphClient::new(&FacebookConfig {
            api_url: "https://graph.example.com/v18.0/".into(),
            timeout_s: 5,
        })
        .unwrap()
    }

    fn credential() -> PageCredential {
        PageCredential {
            page_id: "1001".into(),
            access_token: "EAAB".into(),
        }
    }

    #[test]
    fn test_text_post_goes_to_feed() {
        let content = PostContent {
            message: "Fresh bread\n\n#bakery".into(),
            content_type: ContentType::Post,
            media_urls: vec![],
        };
        let (url, params) = client().request_for(&credential(), &content);

        assert_eq!(url, "https://graph.example.com/v18.0/1001/feed");
        assert_eq!(
            params,
            vec![
                ("message", "Fresh bread\n\n#bakery".to_string()),
                ("access_token", "EAAB".to_string()),
            ]
        );
    }

    #[test]
    fn test_media_post_goes_to_photos() {
        let content = PostContent {
            message: "Loaf".into(),
            content_type: ContentType::Post,
            media_urls: vec!["https://cdn.example.com/a.jpg".into(), "https://cdn.example.com/b.jpg".into()],
        };
        let (url, params) = client().request_for(&credential(), &content);

        assert_eq!(url, "https://graph.example.com/v18.0/1001/photos");
        assert!(params.contains(&("url", "https://cdn.example.com/a.jpg".to_string())));
    }
}
