//! Embedding provider abstraction, vector math, and vector serialization.
//!
//! The [`EmbeddingProvider`] trait is the only thing the engine and the
//! ingestion pipeline know about the model backend. Two implementations ship
//! here:
//! - [`DisabledProvider`] — fails every call; used when embeddings are not
//!   configured.
//! - [`OpenAiProvider`] — calls an OpenAI-compatible embeddings endpoint with
//!   batching, retry, and exponential backoff.
//!
//! The free helpers [`embed_one`] and [`embed_many`] own the two policies the
//! providers must not: oversized inputs are truncated to the provider's
//! maximum input length (lossy but available, never rejected), and large
//! batches are split into provider-sized sub-batches.
//!
//! # Retry Strategy
//!
//! The OpenAI provider retries transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{EmbedContext, KbError, Result};

/// Text-to-vector capability with a fixed output dimensionality.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Output vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Maximum accepted input length in characters; longer inputs are
    /// truncated by the gateway before submission.
    fn max_input_chars(&self) -> usize;
    /// Embed a prepared batch, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let prepared = vec![truncate_chars(text.trim(), provider.max_input_chars())];
    let vectors = provider
        .embed_batch(&prepared)
        .await
        .map_err(|e| KbError::embedding(EmbedContext::Single, e))?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| KbError::embedding(EmbedContext::Single, "empty embedding response"))
}

/// Embed many texts, preserving input order.
///
/// The input is split into sub-batches of `batch_size` to bound single-call
/// latency and memory; the concatenated result has exactly one vector per
/// input text.
pub async fn embed_many(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let prepared: Vec<String> = texts
        .iter()
        .map(|t| truncate_chars(t.trim(), provider.max_input_chars()))
        .collect();

    let mut vectors = Vec::with_capacity(prepared.len());
    for batch in prepared.chunks(batch_size) {
        let mut batch_vectors = provider
            .embed_batch(batch)
            .await
            .map_err(|e| KbError::embedding(EmbedContext::Batch, e))?;
        if batch_vectors.len() != batch.len() {
            return Err(KbError::embedding(
                EmbedContext::Batch,
                format!(
                    "provider returned {} vectors for {} inputs",
                    batch_vectors.len(),
                    batch.len()
                ),
            ));
        }
        vectors.append(&mut batch_vectors);
    }
    Ok(vectors)
}

/// Truncate to at most `max_chars` characters without splitting a scalar.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============ Disabled Provider ============

/// A no-op provider that always returns errors. Used when
/// `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn max_input_chars(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(KbError::Provider(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Provider for the OpenAI embeddings API (or any compatible endpoint).
///
/// Calls `POST {base_url}/embeddings` with the configured model. Requires
/// the `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_input_chars: usize,
    max_retries: u32,
}

impl OpenAiProvider {
    /// Build a provider from configuration.
    ///
    /// Fails if `model` or `dims` is missing from the config, if the API key
    /// is not in the environment, or if the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| KbError::Provider("embedding.model required".to_string()))?;
        let dims = config
            .dims
            .ok_or_else(|| KbError::Provider("embedding.dims required".to_string()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| KbError::Provider("OPENAI_API_KEY environment variable not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KbError::Provider(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dims,
            max_input_chars: config.max_input_chars,
            max_retries: config.max_retries,
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Reorder response items into input order. Providers may return vectors in
/// arbitrary order tagged with the input index.
fn vectors_in_input_order(mut items: Vec<EmbeddingItem>) -> Vec<Vec<f32>> {
    items.sort_by_key(|item| item.index);
    items.into_iter().map(|item| item.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<KbError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingResponse = response
                            .json()
                            .await
                            .map_err(|e| KbError::Provider(e.to_string()))?;
                        let vectors = vectors_in_input_order(parsed.data);
                        for vector in &vectors {
                            if vector.len() != self.dims {
                                return Err(KbError::Provider(format!(
                                    "provider returned {}-dimensional vector, expected {}",
                                    vector.len(),
                                    self.dims
                                )));
                            }
                        }
                        return Ok(vectors);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(KbError::Provider(format!(
                            "embeddings API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(KbError::Provider(format!(
                        "embeddings API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(KbError::Provider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| KbError::Provider("embedding failed after retries".to_string())))
    }
}

/// Create a provider from configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => Err(KbError::Provider(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Vector math ============

/// Cosine similarity between two equal-length vectors, in `[-1.0, 1.0]`.
///
/// Returns exactly `0.0` when either vector has zero magnitude. Unequal
/// lengths are a data-integrity error, never coerced.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(KbError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
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
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Euclidean distance between two equal-length vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(KbError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let sum_squares: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum();

    Ok(sum_squares.sqrt())
}

/// Serialize a vector to its JSON storage form.
pub fn serialize_vector(vector: &[f32]) -> Result<String> {
    Ok(serde_json::to_string(vector)?)
}

/// Decode a vector from its JSON storage form.
pub fn deserialize_vector(raw: &str) -> Result<Vec<f32>> {
    Ok(serde_json::from_str(raw)?)
}
