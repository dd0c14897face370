//! Text embedding clients.
//!
//! [`CohereEmbedder`] calls the Cohere embed API in fixed-size batches, sent
//! concurrently, retrying rate-limit and server errors with exponential
//! backoff. [`HashingEmbedder`] is a deterministic local fallback that needs
//! no network access.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use webextract_shared::{EmbeddingsConfig, Result, WebExtractError};

const USER_AGENT: &str = concat!("webextract/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: usize = 3;

/// Turns text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed passages for storage. Output order matches input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

// ---------------------------------------------------------------------------
// Cohere
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum InputType {
    SearchDocument,
    SearchQuery,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: InputType,
    truncate: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Async client for Cohere's `/v1/embed` endpoint.
#[derive(Clone)]
pub struct CohereEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    batch_size: usize,
    retry_base: Duration,
}

impl CohereEmbedder {
    pub fn new(config: &EmbeddingsConfig, api_key: String) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(WebExtractError::config("embeddings.batch_size must be positive"));
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WebExtractError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            batch_size: config.batch_size,
            retry_base: Duration::from_millis(500),
        })
    }

    /// Override the first retry delay (doubles on each attempt).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    async fn embed_batch(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            texts,
            input_type,
            truncate: "END",
        };

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            let retryable = match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: EmbedResponse = resp.json().await.map_err(|e| {
                        WebExtractError::Embedding(format!("failed to parse embed response: {e}"))
                    })?;
                    if parsed.embeddings.len() != texts.len() {
                        return Err(WebExtractError::Embedding(format!(
                            "embed API returned {} vectors for {} texts",
                            parsed.embeddings.len(),
                            texts.len()
                        )));
                    }
                    return Ok(parsed.embeddings);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let message = format!("embed request failed ({status}): {body}");
                    if !should_retry(status) {
                        return Err(WebExtractError::Embedding(message));
                    }
                    message
                }
                Err(e) if e.is_timeout() || e.is_connect() => format!("embed request failed: {e}"),
                Err(e) => return Err(WebExtractError::Embedding(format!("embed request failed: {e}"))),
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(WebExtractError::Embedding(retryable));
            }
            let backoff = self.retry_base * (1 << (attempt - 1));
            warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %retryable, "retrying embed request");
            tokio::time::sleep(backoff).await;
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl Embedder for CohereEmbedder {
    #[instrument(skip_all, fields(texts = texts.len(), model = %self.model))]
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batches = texts
            .chunks(self.batch_size)
            .map(|batch| self.embed_batch(batch, InputType::SearchDocument));
        let vectors: Vec<Vec<f32>> = try_join_all(batches).await?.into_iter().flatten().collect();
        debug!(vectors = vectors.len(), "embedded documents");
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        self.embed_batch(&texts, InputType::SearchQuery)
            .await?
            .pop()
            .ok_or_else(|| WebExtractError::Embedding("embed API returned no vector".into()))
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Feature-hashing bag-of-words embedder.
///
/// Each lower-cased alphanumeric token is hashed into one of `dimensions`
/// buckets; vectors are L2-normalized. Passages sharing words with a query
/// score higher, which is enough for offline runs and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            vector[index] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }
}
