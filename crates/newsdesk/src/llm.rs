//! Text-generation clients used for scoring and for the final formats.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::Config;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;
}

#[derive(Debug, Error)]
#[error("rate limited by {0}")]
struct RateLimited(&'static str);

/// How many times a request is attempted and how long to wait in between
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            rate_limit_delay: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
        }
    }

    fn backoff(&self, attempt: u32, rate_limited: bool) -> Duration {
        if rate_limited {
            self.rate_limit_delay * (attempt + 1)
        } else {
            self.base_delay * 2_u32.pow(attempt)
        }
    }
}

async fn with_retry<F, Fut>(policy: RetryPolicy, provider: &str, mut call: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match call().await {
            Ok(text) => return Ok(text),
            Err(e) => {
                let rate_limited = e.downcast_ref::<RateLimited>().is_some();
                if attempt + 1 < attempts {
                    let backoff = policy.backoff(attempt, rate_limited);
                    if rate_limited {
                        warn!(provider, ?backoff, "rate limit hit, waiting before retry");
                    }
                    tokio::time::sleep(backoff).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("no attempts made"))
        .context(format!("{provider} request failed after {attempts} attempts")))
}

fn api_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to create HTTP client")
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            client: api_client()?,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            semaphore: Arc::new(Semaphore::new(2)),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn try_generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig { temperature },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RateLimited("gemini").into());
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("Gemini API error: {} - {}", status, error_text);
        }

        let body = response
            .json::<GeminiResponse>()
            .await
            .context("Failed to parse Gemini API response")?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .context("Gemini API returned no text")
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let _permit = self.semaphore.acquire().await?;
        with_retry(self.retry, "gemini", || self.try_generate(prompt, temperature)).await
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    base_url: String,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            client: api_client()?,
            api_key,
            model,
            system_prompt: None,
            base_url: OPENAI_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            semaphore: Arc::new(Semaphore::new(2)),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    async fn try_generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RateLimited("openai").into());
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("OpenAI API error: {} - {}", status, error_text);
        }

        let body = response
            .json::<ChatResponse>()
            .await
            .context("Failed to parse OpenAI API response")?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .context("OpenAI API returned no text")
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let _permit = self.semaphore.acquire().await?;
        with_retry(self.retry, "openai", || self.try_generate(prompt, temperature)).await
    }
}

/// Gemini client when `GEMINI_API_KEY` is configured
pub fn gemini_from_config(config: &Config) -> Result<Option<Arc<dyn LlmClient>>> {
    match &config.gemini_api_key {
        Some(key) => {
            let client = GeminiClient::new(key.clone(), config.gemini_model.clone())?;
            Ok(Some(Arc::new(client)))
        }
        None => Ok(None),
    }
}

/// OpenAI client for the digest re-scoring, when `OPENAI_API_KEY` is configured
pub fn openai_from_config(config: &Config) -> Result<Option<Arc<dyn LlmClient>>> {
    match &config.openai_api_key {
        Some(key) => {
            let client = OpenAiClient::new(key.clone(), config.openai_model.clone())?
                .with_system_prompt("你將只輸出 JSON，且內容極簡。");
            Ok(Some(Arc::new(client)))
        }
        None => Ok(None),
    }
}

/// The JSON object embedded in a model reply, from the first `{` to the last `}`
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_strips_fences() {
        let reply = "```json\n{\"tech\": 4, \"nested\": {\"a\": 1}}\n```";
        assert_eq!(
            extract_json(reply),
            Some("{\"tech\": 4, \"nested\": {\"a\": 1}}")
        );
    }

    #[test]
    fn test_extract_json_without_object() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_backoff_grows() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0, false), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2, false), Duration::from_millis(4000));
        assert_eq!(policy.backoff(1, true), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_gemini_generate() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-1.5-flash:generateContent")
                    .header("x-goog-api-key", "g-key");
                then.status(200).json_body(json!({
                    "candidates": [
                        {"content": {"parts": [{"text": "  你好  "}], "role": "model"}}
                    ]
                }));
            })
            .await;

        let client = GeminiClient::new("g-key".into(), "gemini-1.5-flash".into())
            .unwrap()
            .with_base_url(server.base_url())
            .with_retry(RetryPolicy::immediate(1));
        assert_eq!(client.generate("hi", 0.2).await.unwrap(), "你好");
    }

    #[tokio::test]
    async fn test_gemini_key_stays_out_of_errors() {
        let client = GeminiClient::new("secret-key".into(), "gemini-1.5-flash".into())
            .unwrap()
            .with_base_url("http://127.0.0.1:9")
            .with_retry(RetryPolicy::immediate(1));
        let err = client.generate("hi", 0.2).await.unwrap_err();
        assert!(!format!("{err:#}").contains("secret-key"));
    }

    #[tokio::test]
    async fn test_gemini_gives_up_after_retries() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500).body("boom");
            })
            .await;

        let client = GeminiClient::new("k".into(), "m".into())
            .unwrap()
            .with_base_url(server.base_url())
            .with_retry(RetryPolicy::immediate(2));
        let err = client.generate("hi", 0.2).await.unwrap_err();
        assert!(format!("{err:#}").contains("after 2 attempts"));
    }

    #[tokio::test]
    async fn test_gemini_rate_limit_is_retried_then_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429);
            })
            .await;

        let client = GeminiClient::new("k".into(), "m".into())
            .unwrap()
            .with_base_url(server.base_url())
            .with_retry(RetryPolicy::immediate(3));
        let err = client.generate("hi", 0.2).await.unwrap_err();
        assert!(format!("{err:#}").contains("rate limited by gemini"));
    }

    #[tokio::test]
    async fn test_openai_generate_sends_bearer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("Authorization", "Bearer o-key");
                then.status(200).json_body(json!({
                    "choices": [
                        {"index": 0, "message": {"role": "assistant", "content": "{\"tech\":3}"}}
                    ]
                }));
            })
            .await;

        let client = OpenAiClient::new("o-key".into(), "gpt-4o-mini".into())
            .unwrap()
            .with_system_prompt("json only")
            .with_base_url(server.base_url())
            .with_retry(RetryPolicy::immediate(1));
        let text = client.generate("score this", 0.2).await.unwrap();
        mock.assert_async().await;
        assert_eq!(text, "{\"tech\":3}");
    }

    #[tokio::test]
    async fn test_openai_empty_reply_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({"choices": []}));
            })
            .await;

        let client = OpenAiClient::new("k".into(), "m".into())
            .unwrap()
            .with_base_url(server.base_url())
            .with_retry(RetryPolicy::immediate(1));
        assert!(client.generate("x", 0.1).await.is_err());
    }

    #[test]
    fn test_from_config_without_keys() {
        let config = Config::offline("/tmp");
        assert!(gemini_from_config(&config).unwrap().is_none());
        assert!(openai_from_config(&config).unwrap().is_none());
    }
}
