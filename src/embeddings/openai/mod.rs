
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::{Result, RetrievalError};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const BACKOFF_UNIT_MS: u64 = 500;

/// Client for OpenAI-compatible `/embeddings` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .embedding
            .endpoint()
            .map_err(|e| RetrievalError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            model: config.embedding.model.clone(),
            api_key: config.embedding.api_key.clone(),
            agent: build_agent(config.request_timeout()),
            retry_attempts: config.embedding.retry_attempts,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Blocking embedding call; `embed` runs this on the blocking pool
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self
            .base_url
            .join("embeddings")
            .map_err(|e| RetrievalError::Config(format!("Failed to build embedding URL: {}", e)))?;

        let request_json = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            input: text,
        })
        .map_err(|e| {
            RetrievalError::EmbeddingProvider(format!("Failed to serialize request: {}", e))
        })?;

        let response_text = self
            .make_request_with_retry(|| {
                let mut request = self
                    .agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json");
                if let Some(key) = &self.api_key {
                    request = request.header("Authorization", format!("Bearer {}", key));
                }
                request
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embedding")
            .map_err(|e| RetrievalError::EmbeddingProvider(format!("{:#}", e)))?;

        let mut response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            RetrievalError::InvalidEmbeddingFormat(format!("Unparseable response: {}", e))
        })?;

        if response.data.is_empty() {
            return Err(RetrievalError::InvalidEmbeddingFormat(
                "Response contained no embeddings".to_string(),
            ));
        }
        let embedding = response.data.swap_remove(0).embedding;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> anyhow::Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = Duration::from_millis(
                            EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * BACKOFF_UNIT_MS,
                        );
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || client.generate_embedding(&text))
            .await
            .map_err(|e| RetrievalError::EmbeddingProvider(format!("Embedding task failed: {}", e)))?
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
