//! Text generation via an OpenAI-compatible chat-completions endpoint.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::GenerationConfig;
use crate::error::StartupError;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One generation call. Errors are recovered by the response generator
    /// (apology fallback), never surfaced to the user.
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct OpenAiGenerator {
    client: Client,
    config: GenerationConfig,
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(config: GenerationConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn from_env(config: GenerationConfig) -> Result<Self, StartupError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| StartupError::MissingCredential("OPENAI_API_KEY"))?;
        Self::new(config, api_key)
            .map_err(|e| StartupError::InvalidConfig(format!("generation client: {}", e)))
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let request = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("generation request to {} timed out", self.config.endpoint)
                } else {
                    anyhow!("generation request to {} failed: {}", self.config.endpoint, e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("generation API error ({}): {}", status, body));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("generation API returned no choices"))
    }
}
