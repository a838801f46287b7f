//! Query embedding via an OpenAI-compatible embeddings endpoint.
//!
//! Corpus vectors are precomputed offline; only the question is embedded
//! at request time, so one small cached HTTP call per turn.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroUsize;

use crate::config::EmbeddingConfig;
use crate::error::StartupError;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct ApiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl ApiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        let cache_size = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    /// Build from config + the `OPENAI_API_KEY` environment variable.
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self, StartupError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| StartupError::MissingCredential("OPENAI_API_KEY"))?;
        Self::new(config, api_key)
            .map_err(|e| StartupError::InvalidConfig(format!("embedding client: {}", e)))
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.lock().get(text) {
            return Ok(cached.clone());
        }

        let request = json!({
            "model": self.model,
            "input": [text],
        });
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("embedding request to {} timed out", self.endpoint)
                } else {
                    anyhow!("embedding request to {} failed: {}", self.endpoint, e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("embedding API error ({}): {}", status, body));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("embedding API returned no vectors"))?;

        self.cache.lock().put(text.to_string(), vector.clone());
        Ok(vector)
    }
}
