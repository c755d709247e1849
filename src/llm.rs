//! Chat-completion client.
//!
//! Every supported provider (Groq, OpenAI, Ollama) speaks the OpenAI
//! `POST {base_url}/chat/completions` protocol, so one client covers them;
//! only the base URL, default model and credential differ.
//!
//! Decoding parameters are fixed per client. Transient failures (429, 5xx,
//! network) are retried up to `max_retries` times, honouring `Retry-After`
//! when the server sends it. Any other error status fails immediately.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

const BASE_BACKOFF_SECS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl DecodingParams {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// A language model that answers a structured conversation with text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct OpenAiCompatibleChat {
    client: reqwest::Client,
    provider: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    params: DecodingParams,
}

impl fmt::Debug for OpenAiCompatibleChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleChat")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("params", &self.params)
            .finish()
    }
}

impl OpenAiCompatibleChat {
    pub fn new(
        provider: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        params: DecodingParams,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = params.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider: provider.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            params,
        })
    }

    async fn send(&self, body: &ChatRequest<'_>) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        request.send().await
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
        };

        let mut last_err = None;
        for attempt in 0..=self.params.max_retries {
            let response = match self.send(&body).await {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(Error::Model(format!("{} request failed: {}", self.provider, e)));
                    if attempt < self.params.max_retries {
                        let delay = Duration::from_secs(BASE_BACKOFF_SECS << attempt);
                        tracing::warn!(provider = %self.provider, attempt, "request failed, retrying in {}s", delay.as_secs());
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: ChatResponse = response.json().await.map_err(|e| {
                    Error::Model(format!("{} returned an invalid response: {}", self.provider, e))
                })?;
                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| Error::Model(format!("{} returned no choices", self.provider)));
            }

            let delay = retry_delay(&response, attempt);
            let text = response.text().await.unwrap_or_default();
            let err = Error::Model(format!("{} API error {}: {}", self.provider, status, text));
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_err = Some(err);
                if attempt < self.params.max_retries {
                    tracing::warn!(
                        provider = %self.provider,
                        %status,
                        "retrying in {}s ({}/{})",
                        delay.as_secs(),
                        attempt + 1,
                        self.params.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                continue;
            }
            tracing::error!("{} API error {}: {}", self.provider, status, text);
            return Err(err);
        }

        Err(last_err.unwrap_or_else(|| Error::Model(format!("{} failed after retries", self.provider))))
    }
}

/// `Retry-After` seconds when present, otherwise exponential backoff.
fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(BASE_BACKOFF_SECS << attempt))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Base URL and default model for a provider name.
pub fn provider_defaults(provider: &str) -> Option<(&'static str, &'static str)> {
    match provider {
        "groq" => Some(("https://api.groq.com/openai/v1", "llama-3.1-8b-instant")),
        "openai" => Some(("https://api.openai.com/v1", "gpt-4o-mini")),
        "ollama" => Some(("http://localhost:11434/v1", "llama3.1")),
        _ => None,
    }
}

/// Builds the configured chat model. `key` is the credential resolved by
/// [`Credentials`](crate::config::Credentials).
pub fn create_chat_model(config: &LlmConfig, key: Option<&str>) -> Result<Arc<dyn ChatModel>> {
    let (default_url, default_model) = provider_defaults(&config.provider).ok_or_else(|| {
        Error::Configuration(format!("Unknown llm provider: {}", config.provider))
    })?;
    if key.is_none() && config.provider != "ollama" {
        return Err(Error::Configuration(format!(
            "llm provider '{}' requires an API key",
            config.provider
        )));
    }

    let model = OpenAiCompatibleChat::new(
        config.provider.clone(),
        config.base_url.as_deref().unwrap_or(default_url),
        key.map(str::to_string),
        config
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string()),
        DecodingParams::from_config(config),
    )?;
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(max_retries: u32) -> DecodingParams {
        DecodingParams {
            max_tokens: 1024,
            temperature: 1.5,
            max_retries,
            timeout: Some(Duration::from_secs(5)),
        }
    }

    fn client(server: &MockServer, max_retries: u32) -> OpenAiCompatibleChat {
        OpenAiCompatibleChat::new(
            "groq",
            &server.uri(),
            Some("gsk-test".to_string()),
            "llama-3.1-8b-instant",
            params(max_retries),
        )
        .unwrap()
    }

    fn completion(text: &str) -> serde_json::Value {
        json!({ "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }] })
    }

    #[test]
    fn roles_serialize_lowercase() {
        let v = serde_json::to_value(ChatMessage::system("x")).unwrap();
        assert_eq!(v, json!({ "role": "system", "content": "x" }));
    }

    #[test]
    fn defaults_from_config() {
        let p = DecodingParams::from_config(&LlmConfig::default());
        assert_eq!(p.max_tokens, 1024);
        assert_eq!(p.temperature, 1.5);
        assert_eq!(p.max_retries, 2);
        assert!(p.timeout.is_none());
    }

    #[tokio::test]
    async fn sends_decoding_params_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer gsk-test"))
            .and(body_partial_json(json!({
                "model": "llama-3.1-8b-instant",
                "max_tokens": 1024,
                "temperature": 1.5,
                "messages": [{ "role": "user", "content": "hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello!")))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server, 0)
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(text, "hello!");
    }

    #[tokio::test]
    async fn rate_limit_is_retried_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("finally")))
            .mount(&server)
            .await;

        let text = client(&server, 2)
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(text, "finally");
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 2)
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }

    #[tokio::test]
    async fn client_error_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 2)
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn hosted_providers_require_key() {
        let err = create_chat_model(&LlmConfig::default(), None).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));

        let config = LlmConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        };
        let model = create_chat_model(&config, None).unwrap();
        assert_eq!(model.model_name(), "llama3.1");
    }
}
