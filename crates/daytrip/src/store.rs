//! Knowledge store: per-kind corpus snapshots with precomputed embeddings.
//!
//! Snapshots are produced offline by the crawl/indexing jobs and loaded
//! once per process. After load the corpus is immutable and shared across
//! all concurrent turns without locking on the read path.

use crate::error::StartupError;
use crate::types::{DocKind, Document};
use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One row of a snapshot file: the document plus its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(flatten)]
    pub document: Document,
    pub embedding: Vec<f32>,
}

/// An immutable, loaded corpus for one kind.
pub struct CorpusSnapshot {
    docs: Vec<Document>,
    embeddings: Vec<Vec<f32>>,
}

impl CorpusSnapshot {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn doc(&self, idx: usize) -> &Document {
        &self.docs[idx]
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    /// Squared-L2 distance between the query vector and one document.
    /// Dimension mismatches (stale snapshot vs new embedding model) count
    /// only the overlapping prefix rather than failing the turn.
    pub fn distance(&self, idx: usize, query: &[f32]) -> f32 {
        let emb = &self.embeddings[idx];
        emb.iter()
            .zip(query.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// Nearest documents to the query vector across the whole snapshot,
    /// as (index, distance) pairs sorted ascending by distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut hits: Vec<(usize, f32)> = (0..self.docs.len())
            .map(|i| (i, self.distance(i, query)))
            .collect();
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }
}

/// Loads and caches one snapshot per kind. Readiness is a constructor
/// postcondition: `open` fails fast when a snapshot is missing or empty,
/// so a half-initialized store never serves traffic.
pub struct KnowledgeStore {
    data_dir: PathBuf,
    cache: RwLock<HashMap<DocKind, Arc<CorpusSnapshot>>>,
}

impl KnowledgeStore {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StartupError> {
        let store = Self {
            data_dir: data_dir.into(),
            cache: RwLock::new(HashMap::new()),
        };
        for kind in [DocKind::General, DocKind::Event] {
            let snapshot = store.load(kind)?;
            store.cache.write().insert(kind, Arc::new(snapshot));
        }
        Ok(store)
    }

    /// The cached corpus for a kind. Both kinds are loaded in `open`, so
    /// this is infallible afterwards.
    pub fn corpus(&self, kind: DocKind) -> Arc<CorpusSnapshot> {
        if let Some(snapshot) = self.cache.read().get(&kind) {
            return snapshot.clone();
        }
        // Unreachable after open(). Serve an empty snapshot without
        // caching it, so the miss stays visible instead of becoming a
        // permanently empty slot.
        debug_assert!(false, "corpus cache miss for {} after open", kind.as_str());
        tracing::error!(kind = kind.as_str(), "corpus cache miss after open");
        Arc::new(CorpusSnapshot {
            docs: Vec::new(),
            embeddings: Vec::new(),
        })
    }

    pub fn snapshot_path(&self, kind: DocKind) -> PathBuf {
        self.data_dir.join(format!("{}.json", kind.as_str()))
    }

    fn load(&self, kind: DocKind) -> Result<CorpusSnapshot, StartupError> {
        let path = self.snapshot_path(kind);
        if !path.exists() {
            return Err(StartupError::MissingSnapshot(path));
        }
        let records = Self::read_records(&path).map_err(|source| StartupError::BadSnapshot {
            path: path.clone(),
            source,
        })?;
        if records.is_empty() {
            return Err(StartupError::EmptyCorpus { kind });
        }

        let mut docs = Vec::with_capacity(records.len());
        let mut embeddings = Vec::with_capacity(records.len());
        for record in records {
            docs.push(record.document);
            embeddings.push(record.embedding);
        }
        tracing::info!(kind = kind.as_str(), count = docs.len(), "corpus snapshot loaded");
        Ok(CorpusSnapshot { docs, embeddings })
    }

    fn read_records(path: &Path) -> anyhow::Result<Vec<SnapshotRecord>> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocMetadata;

    fn record(text: &str, kind: DocKind, embedding: Vec<f32>) -> SnapshotRecord {
        SnapshotRecord {
            document: Document {
                text: text.to_string(),
                kind,
                metadata: DocMetadata::default(),
            },
            embedding,
        }
    }

    fn write_snapshots(dir: &Path, general: &[SnapshotRecord], event: &[SnapshotRecord]) {
        std::fs::write(
            dir.join("general.json"),
            serde_json::to_string(general).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.join("event.json"), serde_json::to_string(event).unwrap()).unwrap();
    }

    #[test]
    fn test_open_fails_on_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let err = match KnowledgeStore::open(dir.path()) {
            Ok(_) => panic!("open must fail when a snapshot file is missing"),
            Err(e) => e,
        };
        assert!(matches!(err, StartupError::MissingSnapshot(_)));
    }

    #[test]
    fn test_open_fails_on_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshots(
            dir.path(),
            &[],
            &[record("전시", DocKind::Event, vec![0.0])],
        );
        let err = match KnowledgeStore::open(dir.path()) {
            Ok(_) => panic!("open must fail when a corpus is empty"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            StartupError::EmptyCorpus {
                kind: DocKind::General
            }
        ));
    }

    #[test]
    fn test_search_orders_by_distance() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshots(
            dir.path(),
            &[
                record("가까운 카페", DocKind::General, vec![1.0, 0.0]),
                record("먼 카페", DocKind::General, vec![0.0, 1.0]),
            ],
            &[record("전시", DocKind::Event, vec![0.0, 0.0])],
        );
        let store = KnowledgeStore::open(dir.path()).unwrap();
        let corpus = store.corpus(DocKind::General);

        let hits = corpus.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn test_corpus_is_cached_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshots(
            dir.path(),
            &[record("카페", DocKind::General, vec![0.5])],
            &[record("전시", DocKind::Event, vec![0.5])],
        );
        let store = KnowledgeStore::open(dir.path()).unwrap();
        let a = store.corpus(DocKind::General);
        let b = store.corpus(DocKind::General);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
