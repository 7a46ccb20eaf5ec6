/*!
 * Chat-completion client for trend research and content ideas
 *
 * Requests ask for a JSON object response. Each call goes through the
 * default retry policy, so rate limits, 5xx answers and timeouts are
 * retried with exponential backoff before the failure is surfaced.
 */

use crate::config::LlmConfig;
use crate::http;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pagepilot_core_resilience::{
    classify, with_retry, ClassifiedError, ErrorKind, Lifecycle, LlmFailure,
    RawFailure, Result, RetryPolicy,
};
use pagepilot_scheduler::{ContentIdea, ContentType, IdeaSource, Trend};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub const PROVIDER_NAME: &str = "OpenAI";

/// How long researched trends stay valid
pub const TREND_VALIDITY_DAYS: i64 = 7;

pub struct LlmClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdeasPayload {
    ideas: Vec<ContentIdea>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicsPayload {
    topics: Vec<ResearchedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchedTopic {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    trend_score: f64,
    #[serde(default)]
    hashtags: Vec<String>,
}

fn fail(failure: LlmFailure) -> ClassifiedError {
    classify(RawFailure::llm(PROVIDER_NAME, failure))
}

fn transport(err: &reqwest::Error) -> ClassifiedError {
    if err.is_timeout() {
        return fail(LlmFailure::Timeout);
    }
    let classified = fail(LlmFailure::Other(err.to_string()));
    match http::network_fault(err) {
        Some(fault) => classified.with_network_fault(fault),
        None => classified,
    }
}

fn malformed(reason: impl Into<String>) -> ClassifiedError {
    ClassifiedError::external(format!("{} returned malformed output", PROVIDER_NAME))
        .with_context("service", PROVIDER_NAME)
        .with_context("reason", reason.into())
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = http::build_client(config.timeout())
            .map_err(|failure| classify(RawFailure::http(PROVIDER_NAME, failure)))?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ClassifiedError::new(
                ErrorKind::Authentication,
                format!("{} API key is not configured", PROVIDER_NAME),
            )
            .with_context("service", PROVIDER_NAME)
        })
    }

    /// Send `prompt` and parse the reply as a JSON object
    ///
    /// Only the request is retried; a reply that does not parse fails at once.
    pub async fn complete_json(&self, prompt: &str) -> Result<Value> {
        let text = with_retry(&self.retry, || self.request_completion(prompt)).await?;
        self.parse_completion(&text)
    }

    /// Raw body of a successful chat completion
    async fn request_completion(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let status = response.status();
        let retry_after = http::retry_after(response.headers());
        let text = response.text().await.map_err(|e| transport(&e))?;

        if !status.is_success() {
            return Err(fail(LlmFailure::Response {
                status: status.as_u16(),
                retry_after,
                message: http::error_message(&text),
            }));
        }

        Ok(text)
    }

    fn parse_completion(&self, text: &str) -> Result<Value> {
        let chat: ChatResponse =
            serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| malformed("response contained no message content"))?;

        debug!(model = %self.model, bytes = content.len(), "Completion received");
        serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))
    }

    /// Ask for currently trending topics, optionally within one category
    pub async fn research_trends(
        &self,
        category: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trend>> {
        let scope = match category {
            Some(category) => format!("in the {} category", category),
            None => "across all categories".to_string(),
        };
        let prompt = format!(
            "As a social media expert, identify 5 trending topics {} that are currently \
             popular on Facebook and Instagram. Respond with a JSON object of the form \
             {{\"topics\": [{{\"name\": string, \"description\": string, \
             \"trendScore\": number 1-100, \"hashtags\": [string]}}]}}.",
            scope
        );

        let value = self.complete_json(&prompt).await?;
        let payload: TopicsPayload =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

        let valid_until = now + ChronoDuration::days(TREND_VALIDITY_DAYS);
        Ok(payload
            .topics
            .into_iter()
            .map(|topic| Trend {
                id: uuid::Uuid::new_v4().to_string(),
                topic: topic.name,
                category: category.unwrap_or("general").to_string(),
                description: topic.description,
                trend_score: topic.trend_score.clamp(0.0, 100.0).round() as u32,
                suggested_hashtags: topic.hashtags,
                valid_until,
            })
            .collect())
    }
}

#[async_trait]
impl IdeaSource for LlmClient {
    async fn generate_ideas(
        &self,
        topic: &str,
        content_type: ContentType,
    ) -> Result<Vec<ContentIdea>> {
        let prompt = format!(
            "Generate 3 unique content ideas for Facebook/Instagram about \"{}\". \
             Content type: {}. Respond with a JSON object of the form \
             {{\"ideas\": [{{\"caption\": string (100-200 words), \"hashtags\": [string], \
             \"expectedEngagement\": number 1-100}}]}}.",
            topic, content_type
        );

        let value = self.complete_json(&prompt).await?;
        let payload: IdeasPayload =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
        Ok(payload.ideas)
    }
}

#[async_trait]
impl Lifecycle for LlmClient {
    fn name(&self) -> &str {
        "llm"
    }

    async fn connect(&self) -> Result<()> {
        self.health_check().await
    }

    async fn health_check(&self) -> Result<()> {
        let api_key = self.api_key()?;
        let response = self
            .http
            .get(format!("{}/models", self.api_url))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let retry_after = http::retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        Err(fail(LlmFailure::Response {
            status: status.as_u16(),
            retry_after,
            message: http::error_message(&text),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_is_authentication_failure() {
        let client = LlmClient::new(&LlmConfig::default())
            .unwrap()
            .with_retry_policy(RetryPolicy::no_retry());

        let err = client.complete_json("hi").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert!(client.health_check().await.is_err());
    }

    #[test]
    fn test_malformed_is_external_failure() {
        let err = malformed("expected value at line 1");
        assert_eq!(err.kind, ErrorKind::ExternalServiceError);
        assert_eq!(err.message, "OpenAI returned malformed output");
        assert_eq!(err.upstream_status, None);
    }

    #[test]
    fn test_parse_completion_reads_message_content() {
        let client = LlmClient::new(&LlmConfig::default()).unwrap();
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"ideas\": []}"}}]
        })
        .to_string();

        assert_eq!(client.parse_completion(&body).unwrap(), json!({"ideas": []}));

        let empty = json!({"choices": []}).to_string();
        let err = client.parse_completion(&empty).unwrap_err();
        assert_eq!(err.message, "OpenAI returned malformed output");
    }

    #[test]
    fn test_ideas_payload_shape() {
        let payload: IdeasPayload = serde_json::from_value(json!({
            "ideas": [
                {"caption": "Try our rye", "hashtags": ["rye"], "expectedEngagement": 77},
                {"caption": "No tags"}
            ]
        }))
        .unwrap();

        assert_eq!(payload.ideas.len(), 2);
        assert_eq!(payload.ideas[0].expected_engagement, 77.0);
        assert!(payload.ideas[1].hashtags.is_empty());
    }
}
