//! Generation and embedding backends.
//!
//! HTTP-backed implementations of the [`TextGenerator`] and [`Embedder`]
//! traits against OpenAI-compatible APIs, plus disabled placeholders for
//! configurations without a backend.
//!
//! # Retry Strategy
//!
//! Transient upstream errors use exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Generation calls additionally carry a hard deadline
//! (`generation.timeout_secs`) and retry silently at most once
//! (`generation.max_retries`, default 1) before the failure is surfaced
//! to the user.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tracing::warn;

use crate::adapters::{ChunkSink, Embedder, TextGenerator};
use crate::config::{EmbeddingConfig, GenerationConfig};
use crate::error::{DocentError, Result};
use crate::models::PromptSpec;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_EMBED_URL: &str = "https://api.openai.com/v1/embeddings";

/// Build the provider configured in `[generation]`.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        "disabled" => Ok(Box::new(DisabledGenerator)),
        other => Err(DocentError::Config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

/// Build the provider configured in `[embedding]`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        other => Err(DocentError::Config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Disabled providers ============

/// Placeholder generator used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _spec: &PromptSpec) -> Result<String> {
        Err(DocentError::UpstreamGeneration {
            provider: "disabled".to_string(),
            message: "generation provider is disabled".to_string(),
        })
    }

    async fn generate_stream(&self, _spec: &PromptSpec, _on_chunk: ChunkSink<'_>) -> Result<String> {
        Err(DocentError::UpstreamGeneration {
            provider: "disabled".to_string(),
            message: "generation provider is disabled".to_string(),
        })
    }
}

/// Placeholder embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(DocentError::Embedding {
            provider: "disabled".to_string(),
            message: "embedding provider is disabled".to_string(),
        })
    }

    fn dims(&self) -> usize {
        0
    }
}

// ============ OpenAI-compatible generator ============

/// Chat-completion generator against OpenAI or any compatible endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable. A custom
/// `generation.base_url` points the client at a compatible server.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| DocentError::Config("generation.model required".to_string()))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(DocentError::Config(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }
        let url = config
            .base_url
            .as_deref()
            .map(|base| format!("{}/chat/completions", base.trim_end_matches('/')))
            .unwrap_or_else(|| OPENAI_CHAT_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocentError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            model,
            url,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, spec: &PromptSpec, stream: bool) -> serde_json::Value {
        let mut user_content = String::new();
        if !spec.context_block.is_empty() {
            user_content.push_str(&spec.context_block);
            user_content.push_str("\n\n");
        }
        if !spec.history_block.is_empty() {
            user_content.push_str("Conversation so far:\n");
            user_content.push_str(&spec.history_block);
            user_content.push_str("\n\n");
        }
        user_content.push_str("Question: ");
        user_content.push_str(&spec.query_text);

        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": spec.system_instruction },
                { "role": "user", "content": user_content },
            ],
            "max_tokens": spec.params.max_tokens,
            "temperature": spec.params.temperature,
            "stream": stream,
        })
    }

    fn upstream_error(&self, message: impl Into<String>) -> DocentError {
        DocentError::UpstreamGeneration {
            provider: self.model.clone(),
            message: message.into(),
        }
    }

    async fn call_blocking(&self, spec: &PromptSpec) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| DocentError::Config("OPENAI_API_KEY not set".to_string()))?;
        let body = self.request_body(spec, false);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, "retrying generation call");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| self.upstream_error(e.to_string()))?;
                        return parse_chat_response(&json)
                            .ok_or_else(|| self.upstream_error("malformed chat response"));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(self.upstream_error(format!("HTTP {}: {}", status, body_text)));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(self.upstream_error(format!("HTTP {}: {}", status, body_text)));
                }
                Err(e) => {
                    last_err = Some(self.upstream_error(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| self.upstream_error("generation failed after retries")))
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    async fn generate(&self, spec: &PromptSpec) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.call_blocking(spec)).await {
            Ok(result) => result,
            Err(_) => Err(self.upstream_error(format!(
                "generation timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn generate_stream(
        &self,
        spec: &PromptSpec,
        mut on_chunk: ChunkSink<'_>,
    ) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| DocentError::Config("OPENAI_API_KEY not set".to_string()))?;
        let body = self.request_body(spec, true);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.upstream_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(self.upstream_error(format!("HTTP {}: {}", status, body_text)));
        }

        // OpenAI streams SSE lines: `data: {json}` fragments terminated
        // by `data: [DONE]`. Fragments can split across network reads,
        // so buffer until each newline.
        let mut full_text = String::new();
        let mut line_buf = String::new();
        let mut byte_stream = response.bytes_stream();

        while let Some(piece) = byte_stream.next().await {
            let piece = piece.map_err(|e| self.upstream_error(e.to_string()))?;
            line_buf.push_str(&String::from_utf8_lossy(&piece));

            while let Some(newline) = line_buf.find('\n') {
                let line = line_buf[..newline].trim().to_string();
                line_buf.drain(..=newline);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(full_text);
                }
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
                    if let Some(delta) = parse_stream_delta(&json) {
                        if !delta.is_empty() {
                            full_text.push_str(&delta);
                            on_chunk(&delta);
                        }
                    }
                }
            }
        }

        Ok(full_text)
    }
}

/// Extract `choices[0].message.content` from a blocking chat response.
fn parse_chat_response(json: &serde_json::Value) -> Option<String> {
    json.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract `choices[0].delta.content` from one streamed chunk.
fn parse_stream_delta(json: &serde_json::Value) -> Option<String> {
    json.get("choices")?
        .as_array()?
        .first()?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

// ============ OpenAI-compatible embedder ============

/// Embedding client against the OpenAI embeddings API.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| DocentError::Config("embedding.model required".to_string()))?;
        let dims = config
            .dims
            .ok_or_else(|| DocentError::Config("embedding.dims required".to_string()))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(DocentError::Config(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocentError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| DocentError::Config("OPENAI_API_KEY not set".to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(OPENAI_EMBED_URL)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(|e| DocentError::Embedding {
                                provider: self.model.clone(),
                                message: e.to_string(),
                            })?;
                        return parse_embedding_response(&json).ok_or_else(|| {
                            DocentError::Embedding {
                                provider: self.model.clone(),
                                message: "malformed embeddings response".to_string(),
                            }
                        });
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(DocentError::Embedding {
                            provider: self.model.clone(),
                            message: format!("HTTP {}: {}", status, body_text),
                        });
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(DocentError::Embedding {
                        provider: self.model.clone(),
                        message: format!("HTTP {}: {}", status, body_text),
                    });
                }
                Err(e) => {
                    last_err = Some(DocentError::Embedding {
                        provider: self.model.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| DocentError::Embedding {
            provider: self.model.clone(),
            message: "embedding failed after retries".to_string(),
        }))
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Extract `data[0].embedding` from the embeddings API response.
fn parse_embedding_response(json: &serde_json::Value) -> Option<Vec<f32>> {
    let embedding = json
        .get("data")?
        .as_array()?
        .first()?
        .get("embedding")?
        .as_array()?;
    Some(
        embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect(),
    )
}
