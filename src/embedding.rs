//! Remote embedding and generation capabilities.
//!
//! [`EmbeddingClient`] and [`ChatClient`] are the two remote seams of the
//! engine; [`MistralClient`] implements both against the Mistral HTTP
//! API. Tests substitute deterministic stubs.
//!
//! [`embed_in_batches`] is the batching layer: consecutive batches of at
//! most `batch_size` texts, one round trip each, concatenated in input
//! order. The positional mapping from output vector to input text is
//! exact — downstream code zips embeddings against chunk metadata by
//! index. Any batch failure fails the whole operation; there is no
//! partial success.
//!
//! # Retry strategy
//!
//! `max_retries` defaults to 0 (fail on first error). When raised in the
//! config, HTTP 429 and 5xx responses and network errors retry with
//! exponential backoff (1s, 2s, 4s, ... capped at 32s); other 4xx
//! responses fail immediately.
//!
//! Also hosts the vector utilities shared with the store:
//! [`cosine_similarity`], [`vec_to_blob`], [`blob_to_vec`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::Config;
use crate::error::{EngineError, RemoteKind, Result};
use crate::models::TokenUsage;

/// A completed generation call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Remote embedding capability: order-preserving, one round trip per call.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

/// Remote text-generation capability.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion>;
}

/// Split `texts` into consecutive batches and embed each, preserving
/// input order across batch boundaries.
pub async fn embed_in_batches(
    client: &dyn EmbeddingClient,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let total_batches = texts.len().div_ceil(batch_size.max(1));
    let mut all = Vec::with_capacity(texts.len());

    for (i, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        tracing::info!(
            batch = i + 1,
            total = total_batches,
            size = batch.len(),
            "embedding batch"
        );
        let vectors = client.embed(batch).await?;
        if vectors.len() != batch.len() {
            return Err(EngineError::remote(
                RemoteKind::Embedding,
                None,
                format!(
                    "remote returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                ),
            ));
        }
        all.extend(vectors);
    }

    tracing::info!(vectors = all.len(), "embedding complete");
    Ok(all)
}

/// Embed a single query text.
pub async fn embed_query(client: &dyn EmbeddingClient, text: &str) -> Result<Vec<f32>> {
    let texts = [text.to_string()];
    let vectors = client.embed(&texts).await?;
    vectors.into_iter().next().ok_or_else(|| {
        EngineError::remote(RemoteKind::Embedding, None, "empty embedding response")
    })
}

// ============ Mistral client ============

/// HTTP client for the Mistral embeddings and chat completions endpoints.
/// Implements both capability traits.
pub struct MistralClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    embed_model: String,
    chat_model: String,
    temperature: f64,
    max_tokens: u32,
    max_retries: u32,
}

impl MistralClient {
    /// Build from configuration. Fails fast with
    /// [`EngineError::MissingApiKey`] before any remote call is attempted.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api.resolve_key().ok_or(EngineError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.embedding.timeout_secs))
            .build()
            .map_err(|e| EngineError::remote(RemoteKind::Embedding, None, e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            embed_model: config.api.embed_model.clone(),
            chat_model: config.api.chat_model.clone(),
            temperature: config.chat.temperature,
            max_tokens: config.chat.max_tokens,
            max_retries: config.embedding.max_retries,
        })
    }

    /// POST with retry/backoff for 429, 5xx, and network errors.
    async fn post_json(
        &self,
        kind: RemoteKind,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = EngineError::remote(kind, None, "no attempt made");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<serde_json::Value>().await.map_err(|e| {
                            EngineError::remote(kind, Some(status.as_u16()), e.to_string())
                        });
                    }

                    let status_code = status.as_u16();
                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error: retryable.
                    if status_code == 429 || status.is_server_error() {
                        last_err = EngineError::remote(kind, Some(status_code), body_text);
                        continue;
                    }

                    // Other client errors fail immediately.
                    return Err(EngineError::remote(kind, Some(status_code), body_text));
                }
                Err(e) => {
                    last_err = EngineError::remote(kind, None, e.to_string());
                    continue;
                }
            }
        }

        Err(last_err)
    }
}

#[async_trait]
impl EmbeddingClient for MistralClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": texts,
        });
        let json = self.post_json(RemoteKind::Embedding, &url, &body).await?;
        parse_embedding_response(&json)
    }

    fn model_name(&self) -> &str {
        &self.embed_model
    }
}

#[async_trait]
impl ChatClient for MistralClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let json = self.post_json(RemoteKind::Generation, &url, &body).await?;
        parse_chat_response(&json)
    }
}

/// Extract `data[].embedding` in index order.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        EngineError::remote(
            RemoteKind::Embedding,
            None,
            "invalid response: missing data array",
        )
    })?;

    let mut entries: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EngineError::remote(
                    RemoteKind::Embedding,
                    None,
                    "invalid response: missing embedding",
                )
            })?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        entries.push((index, vec));
    }

    // The API tags each vector with its input index; re-sort to be safe.
    entries.sort_by_key(|(i, _)| *i);
    Ok(entries.into_iter().map(|(_, v)| v).collect())
}

fn parse_chat_response(json: &serde_json::Value) -> Result<Completion> {
    let text = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            EngineError::remote(
                RemoteKind::Generation,
                None,
                "invalid response: missing message content",
            )
        })?
        .to_string();

    let usage_field = |name: &str| {
        json.get("usage")
            .and_then(|u| u.get(name))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    };
    let usage = TokenUsage {
        prompt_tokens: usage_field("prompt_tokens"),
        completion_tokens: usage_field("completion_tokens"),
        total_tokens: usage_field("total_tokens"),
    };

    Ok(Completion { text, usage })
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`. Returns `0.0` for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
