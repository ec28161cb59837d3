/// LLM Client: the single point of entry for all model calls in the analyser.
///
/// ARCHITECTURAL RULE: No other module may talk to the model provider directly.
/// The pipeline only sees the `ModelTransport` trait; `HttpModelClient` is the
/// production implementation and tests substitute their own.
///
/// Retry and timeout policy belong to the caller (see `RetryPolicy`), never to the
/// parsing or extraction code.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::reply::{ModelReply, ReplyEnvelope};

pub mod prompts;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model call failed after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// One role/content pair of a chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// What gets submitted to the text-generation capability.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Caller-configured policy for the external call. The default is a single attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            timeout: Duration::from_secs(120),
        }
    }
}

/// The contract any model provider must satisfy.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ReplyEnvelope>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Chat-completions client with caller-supplied retry logic.
#[derive(Clone)]
pub struct HttpModelClient {
    client: Client,
    api_url: String,
    api_key: String,
    policy: RetryPolicy,
}

impl HttpModelClient {
    pub fn new(api_url: String, api_key: String, policy: RetryPolicy) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(policy.timeout).build()?,
            api_url,
            api_key,
            policy,
        })
    }

    async fn send_once(&self, request: &ModelRequest) -> Result<ModelReply, AttemptError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Retryable(LlmError::Timeout(self.policy.timeout))
                } else {
                    AttemptError::Retryable(LlmError::Http(e))
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("Model API returned {}: {}", status, body);
            return Err(AttemptError::Retryable(LlmError::Api {
                status: status.as_u16(),
                message: body,
            }));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AttemptError::Fatal(LlmError::Api {
                status: status.as_u16(),
                message,
            }));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| AttemptError::Fatal(LlmError::Http(e)))?;

        parse_completion(&raw).map_err(AttemptError::Fatal)
    }
}

/// Decodes a chat-completions body. Anything that is not the documented
/// envelope is a `Parse` error and is not retried.
fn parse_completion(raw: &str) -> Result<ModelReply, LlmError> {
    let body: ChatCompletionResponse = serde_json::from_str(raw)?;

    if let Some(usage) = &body.usage {
        debug!(
            "Model call succeeded: prompt_tokens={}, completion_tokens={}",
            usage.prompt_tokens, usage.completion_tokens
        );
    }

    Ok(first_choice(body))
}

enum AttemptError {
    Retryable(LlmError),
    Fatal(LlmError),
}

#[async_trait]
impl ModelTransport for HttpModelClient {
    /// Retries on 429, 5xx, timeouts and transport errors with exponential backoff,
    /// up to `policy.max_attempts` attempts in total.
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                // 1s, 2s, 4s, ...
                let delay = backoff_delay(attempt);
                warn!(
                    "Model call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(request).await {
                Ok(reply) => return Ok(reply),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if attempts == 1 => Err(e),
            _ => Err(LlmError::Exhausted { attempts }),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(1000 * (1 << (attempt - 1).min(6)))
}

/// Only the first choice is considered; an empty list becomes an envelope
/// without content.
fn first_choice(body: ChatCompletionResponse) -> ModelReply {
    ModelReply::Message(body.choices.into_iter().next().unwrap_or_default())
}
