//! Hybrid retrieval: cascading metadata filters, then a weighted blend of
//! vector similarity, BM25 keyword overlap, and minor-intent scores.
//!
//! Every filter stage falls back to its pre-filter set rather than
//! returning nothing — availability of *any* candidate outranks filter
//! strictness. Any internal failure degrades to an empty result list; the
//! orchestrator tolerates an empty retrieval.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::analyzer::{self, tokenize, MINOR_GROUPS, RESTAURANT_CATEGORY};
use crate::config::SearchConfig;
use crate::embedding::Embedder;
use crate::store::{CorpusSnapshot, KnowledgeStore};
use crate::types::{DocKind, Document, QueryFilters, ScoredDocument};

pub struct HybridRetriever {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    config: SearchConfig,
}

impl HybridRetriever {
    pub fn new(store: Arc<KnowledgeStore>, embedder: Arc<dyn Embedder>, config: SearchConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Best documents for the question, honoring filters and excluding
    /// already-recommended identifiers. Never fails: scoring problems
    /// (embedding unavailable, empty corpus) yield an empty list.
    pub async fn retrieve(
        &self,
        question: &str,
        filters: &QueryFilters,
        excluded: &HashSet<String>,
    ) -> Vec<ScoredDocument> {
        let kind = if filters.is_event {
            DocKind::Event
        } else {
            DocKind::General
        };
        let corpus = self.store.corpus(kind);
        if corpus.is_empty() {
            tracing::warn!(kind = kind.as_str(), "empty corpus, skipping retrieval");
            return Vec::new();
        }

        let candidates = self.filter_candidates(&corpus, filters, excluded);

        match self.score(question, filters, &corpus, &candidates).await {
            Ok(scored) => scored,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval scoring failed, returning no documents");
                Vec::new()
            }
        }
    }

    /// Cascading filters over snapshot indices. Each stage reverts to its
    /// input when it would empty the set.
    fn filter_candidates(
        &self,
        corpus: &CorpusSnapshot,
        filters: &QueryFilters,
        excluded: &HashSet<String>,
    ) -> Vec<usize> {
        let all: Vec<usize> = (0..corpus.len()).collect();

        // Stage 1: district.
        let mut candidates = match (&filters.district, filters.district_short()) {
            (Some(district), Some(short)) => {
                let district = district.to_lowercase();
                let short = short.to_lowercase();
                let kept: Vec<usize> = all
                    .iter()
                    .copied()
                    .filter(|&i| doc_mentions_district(corpus.doc(i), &district, &short))
                    .collect();
                tracing::debug!(district = %district, kept = kept.len(), "district filter");
                if kept.is_empty() {
                    tracing::debug!("district filter matched nothing, keeping whole corpus");
                    all
                } else {
                    kept
                }
            }
            _ => all,
        };

        // Stage 2: category, skipped entirely for event queries.
        if !filters.is_event {
            if let Some(keywords) = filters
                .category
                .as_deref()
                .and_then(analyzer::category_keywords)
            {
                let kept: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&i| doc_matches_category(corpus.doc(i), keywords))
                    .collect();
                tracing::debug!(category = ?filters.category, kept = kept.len(), "category filter");
                if !kept.is_empty() {
                    candidates = kept;
                }
            }
        }

        // Stage 3: ledger exclusion.
        if !excluded.is_empty() {
            let kept: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&i| !excluded.contains(&corpus.doc(i).identifier()))
                .collect();
            tracing::debug!(excluded = excluded.len(), kept = kept.len(), "ledger exclusion");
            if !kept.is_empty() {
                candidates = kept;
            }
        }

        candidates
    }

    async fn score(
        &self,
        question: &str,
        filters: &QueryFilters,
        corpus: &CorpusSnapshot,
        candidates: &[usize],
    ) -> anyhow::Result<Vec<ScoredDocument>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(question).await?;
        let vector_scores = vector_scores(corpus, candidates, &query_embedding);
        let lexical_scores = self.bm25_scores(question, corpus, candidates);
        let minor_scores: Vec<f32> = candidates
            .iter()
            .map(|&i| self.minor_score(&corpus.doc(i).text, filters))
            .collect();

        let vector_weight = if filters.category.as_deref() == Some(RESTAURANT_CATEGORY) {
            self.config.restaurant_vector_weight
        } else {
            self.config.vector_weight
        };
        let keyword_weight = self.config.keyword_weight(vector_weight);
        tracing::debug!(vector_weight, keyword_weight, "weight profile");

        let mut scored: Vec<ScoredDocument> = candidates
            .iter()
            .enumerate()
            .map(|(n, &i)| {
                let vector_score = vector_scores[n];
                let lexical_score = lexical_scores[n];
                let minor_score = minor_scores[n];
                ScoredDocument {
                    doc: corpus.doc(i).clone(),
                    vector_score,
                    lexical_score,
                    minor_score,
                    final_score: vector_weight * vector_score
                        + keyword_weight * (0.5 * lexical_score + 0.5 * minor_score),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let cap = if filters.is_event {
            self.config.event_max_results
        } else {
            self.config.max_results
        };

        if !filters.minor_tags.is_empty() && !filters.is_event {
            scored = diversify(scored, self.config.diversify_pool, cap);
        } else {
            scored.truncate(cap);
        }
        Ok(scored)
    }

    /// BM25 over the candidate set only, normalized to [0, 1] by the max
    /// score. Restricting the statistics to the filtered candidates keeps
    /// scores comparable after filtering.
    fn bm25_scores(&self, question: &str, corpus: &CorpusSnapshot, candidates: &[usize]) -> Vec<f32> {
        let query_tokens = tokenize(question);
        let doc_tokens: Vec<Vec<String>> = candidates
            .iter()
            .map(|&i| tokenize(&corpus.doc(i).text))
            .collect();

        let n = doc_tokens.len() as f32;
        let avg_len = doc_tokens.iter().map(|t| t.len() as f32).sum::<f32>() / n.max(1.0);

        // Document frequency per query term.
        let mut df: HashMap<&str, f32> = HashMap::new();
        for term in &query_tokens {
            let count = doc_tokens
                .iter()
                .filter(|tokens| tokens.iter().any(|t| t == term))
                .count() as f32;
            df.insert(term.as_str(), count);
        }

        let k1 = self.config.bm25_k1;
        let b = self.config.bm25_b;
        let raw: Vec<f32> = doc_tokens
            .iter()
            .map(|tokens| {
                let len = tokens.len() as f32;
                query_tokens
                    .iter()
                    .map(|term| {
                        let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let dfi = df.get(term.as_str()).copied().unwrap_or(0.0);
                        let idf = (((n - dfi + 0.5) / (dfi + 0.5)) + 1.0).ln();
                        idf * (tf * (k1 + 1.0))
                            / (tf + k1 * (1.0 - b + b * len / avg_len.max(1.0)))
                    })
                    .sum()
            })
            .collect();

        let max = raw.iter().cloned().fold(0.0f32, f32::max);
        raw.iter().map(|s| (s / (max + 1e-6)).clamp(0.0, 1.0)).collect()
    }

    /// Score for minor-intent keyword groups present in the document text.
    /// Groups the user explicitly asked for earn a small bonus; the total
    /// is capped at 1.0.
    fn minor_score(&self, text: &str, filters: &QueryFilters) -> f32 {
        let lower = text.to_lowercase();
        let mut score = 0.0;
        for (group, keywords) in MINOR_GROUPS {
            if keywords.iter().any(|k| lower.contains(k)) {
                score += self.config.minor_group_score;
                if filters.minor_tags.contains(group) {
                    score += self.config.requested_tag_bonus;
                }
            }
        }
        score.min(1.0)
    }
}

fn doc_mentions_district(doc: &Document, district: &str, short: &str) -> bool {
    let text = doc.text.to_lowercase();
    let location = doc.metadata.location.to_lowercase();
    let address = doc.metadata.address.to_lowercase();
    text.contains(district)
        || text.contains(short)
        || location.contains(district)
        || location.contains(short)
        || address.contains(district)
        || address.contains(short)
}

fn doc_matches_category(doc: &Document, keywords: &[&str]) -> bool {
    let text = doc.text.to_lowercase();
    if keywords.iter().any(|k| text.contains(k)) {
        return true;
    }
    doc.metadata
        .category
        .as_deref()
        .map(|c| {
            let c = c.to_lowercase();
            keywords.iter().any(|k| c.contains(k))
        })
        .unwrap_or(false)
}

/// Distances normalized to [0, 1] similarity scores across the candidate
/// set: re-normalizing only over filtered candidates keeps scores
/// comparable after filtering.
fn vector_scores(corpus: &CorpusSnapshot, candidates: &[usize], query: &[f32]) -> Vec<f32> {
    let distances: Vec<f32> = candidates
        .iter()
        .map(|&i| corpus.distance(i, query))
        .collect();
    let max = distances.iter().cloned().fold(0.0f32, f32::max);
    distances
        .iter()
        .map(|d| (1.0 - d / (max + 1e-6)).clamp(0.0, 1.0))
        .collect()
}

/// Among the top-scored pool, greedily keep at most one document per
/// distinct minor-tag group before falling back to plain score order, so a
/// "hidden gem" query does not return three near-identical hidden cafes.
fn diversify(scored: Vec<ScoredDocument>, pool: usize, cap: usize) -> Vec<ScoredDocument> {
    let pool_size = pool.min(scored.len());
    let mut picked: Vec<ScoredDocument> = Vec::with_capacity(cap);
    let mut picked_idx: HashSet<usize> = HashSet::new();
    let mut used_groups: HashSet<&str> = HashSet::new();

    for (i, item) in scored.iter().take(pool_size).enumerate() {
        if picked.len() >= cap {
            break;
        }
        let lower = item.doc.text.to_lowercase();
        let group = MINOR_GROUPS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(group, _)| *group);
        if let Some(group) = group {
            if used_groups.insert(group) {
                picked.push(item.clone());
                picked_idx.insert(i);
            }
        }
    }

    // Fill remaining slots by score order.
    for (i, item) in scored.into_iter().enumerate() {
        if picked.len() >= cap {
            break;
        }
        if !picked_idx.contains(&i) {
            picked.push(item);
        }
    }

    picked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::store::SnapshotRecord;
    use crate::types::DocMetadata;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::Path;

    /// Deterministic embedder: a fixed vector regardless of input, or an
    /// error when constructed as failing.
    struct StubEmbedder {
        vector: Vec<f32>,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.fail {
                anyhow::bail!("embedding service down");
            }
            Ok(self.vector.clone())
        }
    }

    fn record(text: &str, kind: DocKind, location: &str, embedding: Vec<f32>) -> SnapshotRecord {
        SnapshotRecord {
            document: Document {
                text: text.to_string(),
                kind,
                metadata: DocMetadata {
                    title: Some(text.chars().take(8).collect()),
                    location: location.to_string(),
                    ..Default::default()
                },
            },
            embedding,
        }
    }

    fn write_store(dir: &Path, general: Vec<SnapshotRecord>, event: Vec<SnapshotRecord>) -> Arc<KnowledgeStore> {
        std::fs::write(
            dir.join("general.json"),
            serde_json::to_string(&general).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.join("event.json"), serde_json::to_string(&event).unwrap()).unwrap();
        Arc::new(KnowledgeStore::open(dir).unwrap())
    }

    fn general_corpus() -> Vec<SnapshotRecord> {
        vec![
            record(
                "마포구 연남동의 숨은 카페, 조용하고 한적한 분위기",
                DocKind::General,
                "서울 마포구",
                vec![1.0, 0.0],
            ),
            record(
                "마포구 현지인 단골 맛집, 동네 주민들이 찾는 식당",
                DocKind::General,
                "서울 마포구",
                vec![0.8, 0.2],
            ),
            record(
                "강남구 대형 프랜차이즈 카페",
                DocKind::General,
                "서울 강남구",
                vec![0.0, 1.0],
            ),
        ]
    }

    fn event_corpus() -> Vec<SnapshotRecord> {
        vec![
            record("종로구 미술관 전시", DocKind::Event, "서울 종로구", vec![1.0, 0.0]),
            record("서초구 콘서트 공연", DocKind::Event, "서울 서초구", vec![0.0, 1.0]),
        ]
    }

    fn retriever(store: Arc<KnowledgeStore>, fail_embed: bool) -> HybridRetriever {
        HybridRetriever::new(
            store,
            Arc::new(StubEmbedder {
                vector: vec![1.0, 0.0],
                fail: fail_embed,
            }),
            SearchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_district_filter_keeps_matching_docs() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path(), general_corpus(), event_corpus());
        let filters = crate::analyzer::analyze("서울 마포구 숨은 카페");

        let results = retriever(store, false)
            .retrieve("서울 마포구 숨은 카페", &filters, &HashSet::new())
            .await;

        assert!(!results.is_empty());
        for item in &results {
            let loc = &item.doc.metadata.location;
            assert!(
                loc.contains("마포구") || item.doc.text.contains("마포구"),
                "non-district doc {:?} survived the filter",
                item.doc.metadata.title
            );
        }
    }

    #[tokio::test]
    async fn test_score_bounds_and_convexity() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path(), general_corpus(), event_corpus());
        let filters = crate::analyzer::analyze("마포구 숨은 카페");

        let results = retriever(store, false)
            .retrieve("마포구 숨은 카페", &filters, &HashSet::new())
            .await;

        for item in &results {
            assert!((0.0..=1.0).contains(&item.vector_score));
            assert!((0.0..=1.0).contains(&item.lexical_score));
            assert!((0.0..=1.0).contains(&item.minor_score));
            assert!((0.0..=1.0).contains(&item.final_score));
        }
        // Descending by final score.
        for pair in results.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
    }

    #[tokio::test]
    async fn test_exclusion_falls_back_when_it_would_empty_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path(), general_corpus(), event_corpus());
        let filters = crate::analyzer::analyze("마포구 카페");

        // Exclude every document in the corpus.
        let excluded: HashSet<String> = store
            .corpus(DocKind::General)
            .docs()
            .iter()
            .map(|d| d.identifier())
            .collect();

        let results = retriever(store, false)
            .retrieve("마포구 카페", &filters, &excluded)
            .await;
        assert!(!results.is_empty(), "total exclusion must fall back, not go empty");
    }

    #[tokio::test]
    async fn test_exclusion_drops_previously_recommended() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path(), general_corpus(), event_corpus());
        // No category keyword, so both 마포구 docs stay in play and the
        // exclusion has somewhere to fall.
        let filters = crate::analyzer::analyze("마포구 좋은 곳 추천");

        let first_id = store.corpus(DocKind::General).doc(1).identifier();
        let mut excluded = HashSet::new();
        excluded.insert(first_id.clone());

        let results = retriever(store, false)
            .retrieve("마포구 좋은 곳 추천", &filters, &excluded)
            .await;
        assert!(results.iter().all(|r| r.doc.identifier() != first_id));
    }

    #[tokio::test]
    async fn test_event_query_uses_event_corpus_and_skips_category_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path(), general_corpus(), event_corpus());
        let filters = crate::analyzer::analyze("종로구 전시회 추천");
        assert!(filters.is_event);

        let results = retriever(store, false)
            .retrieve("종로구 전시회 추천", &filters, &HashSet::new())
            .await;
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.doc.kind == DocKind::Event));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path(), general_corpus(), event_corpus());
        let filters = crate::analyzer::analyze("마포구 카페");

        let results = retriever(store, true)
            .retrieve("마포구 카페", &filters, &HashSet::new())
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_district_falls_back_to_whole_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path(), general_corpus(), event_corpus());
        // District present in the question but absent from every document.
        let filters = crate::analyzer::analyze("도봉구 카페");

        let results = retriever(store, false)
            .retrieve("도봉구 카페", &filters, &HashSet::new())
            .await;
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn test_category_filter_reverts_when_it_would_empty_the_set() {
        let dir = tempfile::tempdir().unwrap();
        // No document carries a restaurant keyword.
        let general = vec![
            record(
                "마포구 연남동 산책 코스",
                DocKind::General,
                "서울 마포구",
                vec![1.0, 0.0],
            ),
            record(
                "마포구 조용한 공원",
                DocKind::General,
                "서울 마포구",
                vec![0.9, 0.1],
            ),
        ];
        let store = write_store(dir.path(), general, event_corpus());
        let filters = crate::analyzer::analyze("마포구 맛집 추천");
        assert_eq!(filters.category.as_deref(), Some("맛집"));

        let results = retriever(store, false)
            .retrieve("마포구 맛집 추천", &filters, &HashSet::new())
            .await;
        assert!(
            !results.is_empty(),
            "category filter matching nothing must revert to the district set"
        );
    }

    #[tokio::test]
    async fn test_general_retrieval_truncates_to_cap() {
        let dir = tempfile::tempdir().unwrap();
        let general: Vec<SnapshotRecord> = (0..5)
            .map(|i| {
                record(
                    &format!("마포구 카페 {}", i),
                    DocKind::General,
                    "서울 마포구",
                    vec![1.0 - i as f32 * 0.1, i as f32 * 0.1],
                )
            })
            .collect();
        let store = write_store(dir.path(), general, event_corpus());
        let filters = crate::analyzer::analyze("마포구 카페");

        let results = retriever(store, false)
            .retrieve("마포구 카페", &filters, &HashSet::new())
            .await;
        assert_eq!(results.len(), SearchConfig::default().max_results);
    }

    #[test]
    fn test_diversify_picks_one_doc_per_group_first() {
        let mk = |text: &str, score: f32| ScoredDocument {
            doc: Document {
                text: text.to_string(),
                kind: DocKind::General,
                metadata: DocMetadata::default(),
            },
            vector_score: score,
            lexical_score: score,
            minor_score: score,
            final_score: score,
        };
        let scored = vec![
            mk("숨은 카페 A", 0.9),
            mk("숨겨진 카페 B", 0.8),
            mk("현지인 단골 식당", 0.7),
            mk("우연히 발견한 바", 0.6),
        ];

        let picked = diversify(scored, 10, 3);
        assert_eq!(picked.len(), 3);
        // One per group: 숨은 (A), 로컬 (식당), 우연 (바) — B is squeezed out
        // even though it outscores the other groups' docs.
        let texts: Vec<&str> = picked.iter().map(|p| p.doc.text.as_str()).collect();
        assert!(texts.contains(&"숨은 카페 A"));
        assert!(texts.contains(&"현지인 단골 식당"));
        assert!(texts.contains(&"우연히 발견한 바"));
    }

    #[test]
    fn test_restaurant_category_shifts_weights() {
        let config = SearchConfig::default();
        assert!(config.restaurant_vector_weight < config.vector_weight);
        assert_eq!(config.keyword_weight(config.restaurant_vector_weight), 0.8);
    }
}
