use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Which corpus a document belongs to. Event documents (exhibitions,
/// performances, concerts) live in their own snapshot and flow through a
/// different prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    General,
    Event,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Event => "event",
        }
    }
}

/// Structured metadata carried by every corpus document. All fields are
/// best-effort: the crawl jobs that build the snapshots leave blanks where
/// the source page had none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// An immutable knowledge-store record. Never mutated after snapshot load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub kind: DocKind,
    #[serde(default)]
    pub metadata: DocMetadata,
}

impl Document {
    /// Best-effort unique key for dedup across turns: explicit id, else
    /// title, else a hash of the body text. Opaque — only compared for
    /// equality, never parsed.
    pub fn identifier(&self) -> String {
        if let Some(id) = &self.metadata.id {
            if !id.is_empty() {
                return id.clone();
            }
        }
        if let Some(title) = &self.metadata.title {
            if !title.is_empty() {
                return title.clone();
            }
        }
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.text.hash(&mut hasher);
        format!("doc-{:016x}", hasher.finish())
    }
}

/// Filters derived from one question. Read-only downstream of the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub category: Option<String>,
    /// Normalized long-form district name, e.g. "서울 마포구".
    pub district: Option<String>,
    /// Matched minor-intent groups, e.g. {"숨은", "로컬"}.
    pub minor_tags: BTreeSet<String>,
    pub is_event: bool,
}

impl QueryFilters {
    /// Short district name without the city prefix ("마포구").
    pub fn district_short(&self) -> Option<String> {
        self.district
            .as_deref()
            .map(|d| d.trim_start_matches("서울 ").to_string())
    }
}

/// A document plus its per-retrieval scores. Transient — created and
/// discarded within one retrieval call.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub doc: Document,
    pub vector_score: f32,
    pub lexical_score: f32,
    pub minor_score: f32,
    pub final_score: f32,
}

/// One result from the external place-search API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaceResult {
    pub title: String,
    pub address: String,
    pub road_address: String,
    pub category: String,
    pub description: String,
    pub link: String,
}

/// Everything one turn accumulates on its way to an answer. Built fresh per
/// turn; only the mentioned identifiers outlive it (folded into the ledger).
#[derive(Debug, Clone)]
pub struct TurnState {
    pub session_id: String,
    pub question: String,
    pub filters: QueryFilters,
    pub retrieved: Vec<ScoredDocument>,
    pub external: Vec<PlaceResult>,
    pub answer: String,
}

/// Output of the response generator: the answer text plus the place
/// identifiers it mentioned (for the session ledger).
#[derive(Debug, Clone, Default)]
pub struct GeneratedAnswer {
    pub text: String,
    pub mentioned: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: Option<&str>, title: Option<&str>, text: &str) -> Document {
        Document {
            text: text.to_string(),
            kind: DocKind::General,
            metadata: DocMetadata {
                id: id.map(String::from),
                title: title.map(String::from),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_identifier_prefers_explicit_id() {
        let d = doc(Some("blog-42"), Some("어느 카페"), "본문");
        assert_eq!(d.identifier(), "blog-42");
    }

    #[test]
    fn test_identifier_falls_back_to_title_then_hash() {
        let d = doc(None, Some("어느 카페"), "본문");
        assert_eq!(d.identifier(), "어느 카페");

        let d = doc(None, None, "본문");
        assert!(d.identifier().starts_with("doc-"));
        // Same text, same key.
        assert_eq!(d.identifier(), doc(None, None, "본문").identifier());
    }

    #[test]
    fn test_district_short_strips_city_prefix() {
        let filters = QueryFilters {
            district: Some("서울 마포구".to_string()),
            ..Default::default()
        };
        assert_eq!(filters.district_short().as_deref(), Some("마포구"));
    }
}
