//! LLM gateway.
//!
//! [`LlmGateway`] wraps one chat-completion call with a timeout and an
//! explicit [`RetryPolicy`]. The transport sits behind the [`ChatBackend`]
//! trait; [`OpenAiChat`] talks to the OpenAI chat completions API.
//!
//! The gateway does not interpret reply content. It returns a
//! [`ChatReply`] (free text or a function call) or a typed
//! [`GatewayError`] once the retry budget is spent.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use uxaudit_core::error::{GatewayError, GatewayErrorKind};
use uxaudit_core::prompt::{function_schema, ImageDetail, Prompt, PromptSettings, FUNCTION_NAME};

use crate::config::LlmConfig;
use crate::embedding::{status_kind, transport_error};

/// One image part of the user message.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePart {
    /// Text sent right before the image, e.g. `Frame 12`.
    pub label: String,
    /// `data:image/jpeg;base64,...`
    pub data_url: String,
    pub detail: ImageDetail,
}

/// A fully assembled chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user_text: String,
    pub images: Vec<ImagePart>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Force the `analyze_ux_workflow` function.
    pub function_call: bool,
}

impl ChatRequest {
    pub fn from_prompt(prompt: &Prompt, settings: &PromptSettings, images: Vec<ImagePart>) -> Self {
        Self {
            model: settings.model.clone(),
            system: prompt.system.clone(),
            user_text: prompt.user_text.clone(),
            images,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            function_call: prompt.function_call,
        }
    }

    /// OpenAI chat completions request body.
    pub fn to_openai_body(&self) -> Value {
        let mut content = vec![json!({"type": "text", "text": self.user_text})];
        for image in &self.images {
            content.push(json!({"type": "text", "text": image.label}));
            content.push(json!({
                "type": "image_url",
                "image_url": {"url": image.data_url, "detail": image.detail.as_str()}
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system},
                {"role": "user", "content": content}
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        if self.function_call {
            body["tools"] = json!([{"type": "function", "function": function_schema()}]);
            body["tool_choice"] = json!({"type": "function", "function": {"name": FUNCTION_NAME}});
        }
        body
    }
}

/// A model reply, uninterpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    Text(String),
    FunctionCall { name: String, arguments: String },
}

/// Pull the reply out of a chat completions response.
///
/// Accepts a tool call, a legacy `function_call`, or plain content, in that
/// order of preference.
pub fn parse_chat_response(json: &Value) -> Result<ChatReply, GatewayError> {
    let message = json
        .pointer("/choices/0/message")
        .ok_or_else(|| invalid("response has no choices[0].message"))?;

    let call = message
        .pointer("/tool_calls/0/function")
        .or_else(|| message.get("function_call"));
    if let Some(call) = call {
        let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
        let arguments = call
            .get("arguments")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("function call has no arguments"))?;
        return Ok(ChatReply::FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        });
    }

    match message.get("content").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(ChatReply::Text(text.to_string())),
        _ => Err(invalid("response message has no content")),
    }
}

fn invalid(message: &str) -> GatewayError {
    GatewayError::new(GatewayErrorKind::InvalidResponse, message)
}

/// Transport for one chat call.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, GatewayError>;
}

/// OpenAI chat completions over HTTPS.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiChat {
    /// Build from config; the API key comes from `OPENAI_API_KEY`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        // The gateway enforces the per-call timeout; this one only bounds
        // a hung connection.
        let client = reqwest::Client::builder()
            .timeout(config.timeout() + Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request.to_openai_body())
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::new(
                status_kind(status.as_u16()),
                format!("OpenAI API error {}: {}", status, body_text),
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::new(GatewayErrorKind::InvalidResponse, e.to_string()))?;
        if let Some(tokens) = json.pointer("/usage/total_tokens").and_then(Value::as_u64) {
            debug!(model = %request.model, tokens, "chat call succeeded");
        }
        parse_chat_response(&json)
    }
}

/// Bounded retries with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based): `base_delay * 2^(retry-1)`.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay * (1u32 << exponent)
    }
}

/// Timeout and retry around a [`ChatBackend`].
pub struct LlmGateway {
    backend: Arc<dyn ChatBackend>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl LlmGateway {
    pub fn new(backend: Arc<dyn ChatBackend>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            backend,
            policy,
            timeout,
        }
    }

    pub fn from_config(backend: Arc<dyn ChatBackend>, config: &LlmConfig) -> Self {
        Self::new(
            backend,
            RetryPolicy::new(config.max_retries, config.base_delay()),
            config.timeout(),
        )
    }

    pub async fn call(&self, request: &ChatRequest) -> Result<ChatReply, GatewayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.timeout, self.backend.send(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(GatewayError::new(
                    GatewayErrorKind::Timeout,
                    format!("no reply within {}s", self.timeout.as_secs()),
                )),
            };

            match outcome {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    if attempt >= self.policy.max_attempts() {
                        return Err(err.with_attempts(attempt));
                    }
                    let delay = self.policy.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        kind = %err.kind,
                        delay_ms = delay.as_millis() as u64,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
