use crate::domain::model::ChatMessage;
use crate::domain::ports::CompletionProvider;
use crate::utils::error::{Result, TrandError};
use crate::utils::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const SERVICE: &str = "openai";

#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.5,
            max_tokens: 1200,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    options: CompletionOptions,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            options,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: &self.options.model,
            messages,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        tracing::debug!("Sending {} messages to {} ({})", messages.len(), url, self.options.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(TrandError::AuthenticationError {
                    service: SERVICE.to_string(),
                    status: status.as_u16(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(TrandError::RateLimitError {
                    service: SERVICE.to_string(),
                })
            }
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(TrandError::ApiStatusError {
                    service: SERVICE.to_string(),
                    status: s.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        let body: ChatCompletionResponse = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TrandError::InvalidResponseError {
                service: SERVICE.to_string(),
                message: "completion has no text content".to_string(),
            })?;

        Ok(text)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let text = with_retry(self.retry, "Completion request", || {
            self.request_completion(messages)
        })
        .await?;
        tracing::info!("🤖 Received completion ({} chars)", text.len());
        Ok(text)
    }
}
