use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the per-kind corpus snapshots (general.json,
    /// event.json) and the ledger file.
    pub data_dir: PathBuf,
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
    pub external: ExternalSearchConfig,
    pub generation: GenerationConfig,
}

/// Ranking knobs. The weight constants are tunable parameters, not fixed
/// contracts — tests pin behavior through explicit configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Output cap for general retrieval.
    pub max_results: usize,
    /// Output cap for event retrieval.
    pub event_max_results: usize,
    /// Weight of the vector-similarity score; keyword weight is 1 - this.
    pub vector_weight: f32,
    /// Vector weight override for restaurant queries, where lexical
    /// precision matters more than semantic similarity.
    pub restaurant_vector_weight: f32,
    /// Score added per minor-keyword group found in a document.
    pub minor_group_score: f32,
    /// Extra score when the matched group was explicitly requested.
    pub requested_tag_bonus: f32,
    /// How many top-scored candidates diversification considers.
    pub diversify_pool: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub cache_size: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSearchConfig {
    pub endpoint: String,
    /// How many items to request from the API before sampling.
    pub display: usize,
    /// How many sampled results flow into the prompt.
    pub max_results: usize,
    pub timeout_secs: u64,
    /// Region keyword used when the question names no district.
    pub default_region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.search.max_results == 0 || self.search.event_max_results == 0 {
            return Err("search.max_results must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.vector_weight) {
            return Err("search.vector_weight must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.search.restaurant_vector_weight) {
            return Err("search.restaurant_vector_weight must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.search.minor_group_score) {
            return Err("search.minor_group_score must be in [0.0, 1.0]".into());
        }
        if self.search.diversify_pool < self.search.max_results {
            return Err("search.diversify_pool must be >= search.max_results".into());
        }
        if self.external.display < self.external.max_results {
            return Err("external.display must be >= external.max_results".into());
        }
        if self.embedding.cache_size == 0 {
            return Err("embedding.cache_size must be > 0".into());
        }
        if self.generation.max_tokens == 0 {
            return Err("generation.max_tokens must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = if Path::new("data").exists() {
            PathBuf::from("data")
        } else if let Ok(env_path) = std::env::var("DAYTRIP_DATA_DIR") {
            PathBuf::from(env_path)
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("daytrip")
        };

        Self {
            data_dir,
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            external: ExternalSearchConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            event_max_results: 3,
            vector_weight: 0.4,
            restaurant_vector_weight: 0.2,
            minor_group_score: 0.35,
            requested_tag_bonus: 0.05,
            diversify_pool: 10,
            bm25_k1: 1.5,
            bm25_b: 0.75,
        }
    }
}

impl SearchConfig {
    pub fn keyword_weight(&self, vector_weight: f32) -> f32 {
        1.0 - vector_weight
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            model: "text-embedding-ada-002".to_string(),
            cache_size: 1000,
            timeout_secs: 20,
        }
    }
}

impl Default for ExternalSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openapi.naver.com/v1/search/local.json".to_string(),
            display: 10,
            max_results: 3,
            timeout_secs: 10,
            default_region: "서울".to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1500,
            timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_weight() {
        let mut config = EngineConfig::default();
        config.search.vector_weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_display_below_cap() {
        let mut config = EngineConfig::default();
        config.external.display = 1;
        assert!(config.validate().is_err());
    }
}
