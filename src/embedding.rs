//! Embedding clients.
//!
//! Implementations of [`QueryEmbedder`]:
//! - **[`DisabledEmbedder`]**: fails every call; used when embeddings are not configured.
//!   Retrieval degrades to an empty context.
//! - **[`OpenAiEmbedder`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//!
//! # Retry Strategy
//!
//! - Any HTTP error status, network error or timeout → retry
//! - The last error is returned once the budget is spent
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use uxaudit_core::embedding::QueryEmbedder;
use uxaudit_core::error::{AuditError, AuditResult, GatewayError, GatewayErrorKind};

use crate::config::EmbeddingConfig;

/// Embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl QueryEmbedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> AuditResult<Vec<f32>> {
        Err(AuditError::Configuration(
            "embedding provider is disabled".to_string(),
        ))
    }
}

/// Embedder backed by `POST {api_base}/embeddings`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dims: usize,
    max_retries: u32,
    backoff_unit: Duration,
}

impl OpenAiEmbedder {
    /// Build from config; the API key comes from `OPENAI_API_KEY`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            model,
            dims,
            max_retries: config.max_retries,
            backoff_unit: Duration::from_secs(1),
        })
    }

    /// Shorten the backoff unit (tests).
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Embed a batch of texts, returned in input order.
    pub async fn embed_batch(&self, texts: &[String]) -> AuditResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;
        let mut attempts = 0;
        for attempt in 0..=self.max_retries {
            attempts = attempt + 1;
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = self.backoff_unit * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            GatewayError::new(GatewayErrorKind::InvalidResponse, e.to_string())
                                .with_attempts(attempts)
                        })?;
                        let vectors = parse_embeddings(&json)
                            .map_err(|e| e.with_attempts(attempts))?;
                        if vectors.len() != texts.len() {
                            return Err(GatewayError::new(
                                GatewayErrorKind::InvalidResponse,
                                format!(
                                    "expected {} embeddings, got {}",
                                    texts.len(),
                                    vectors.len()
                                ),
                            )
                            .with_attempts(attempts)
                            .into());
                        }
                        return Ok(vectors);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let kind = status_kind(status.as_u16());
                    let err = GatewayError::new(
                        kind,
                        format!("OpenAI API error {}: {}", status, body_text),
                    );
                    warn!(attempt = attempts, %status, "embedding request failed, retrying");
                    last_err = Some(err);
                    continue;
                }
                Err(e) => {
                    warn!(attempt = attempts, error = %e, "embedding request failed, retrying");
                    last_err = Some(transport_error(&e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| {
                GatewayError::new(GatewayErrorKind::Network, "embedding failed after retries")
            })
            .with_attempts(attempts)
            .into())
    }
}

#[async_trait]
impl QueryEmbedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> AuditResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            GatewayError::new(GatewayErrorKind::InvalidResponse, "empty embedding response")
                .into()
        })
    }
}

/// Map an HTTP status to a gateway error kind.
pub fn status_kind(status: u16) -> GatewayErrorKind {
    match status {
        429 => GatewayErrorKind::RateLimited,
        408 | 504 => GatewayErrorKind::Timeout,
        other => GatewayErrorKind::Http(other),
    }
}

/// Map a transport failure to a gateway error.
pub fn transport_error(err: &reqwest::Error) -> GatewayError {
    let kind = if err.is_timeout() {
        GatewayErrorKind::Timeout
    } else {
        GatewayErrorKind::Network
    };
    GatewayError::new(kind, err.to_string())
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, GatewayError> {
    let invalid = |msg: &str| GatewayError::new(GatewayErrorKind::InvalidResponse, msg);
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Build the configured embedder.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn QueryEmbedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
