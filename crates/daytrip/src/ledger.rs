//! Session recommendation ledger: which places a conversation has already
//! been shown. Append-only set semantics per session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Per-session append-only set of place identifiers. The chat-history
/// collaborator may back this with its own storage; the in-memory
/// implementation below ships as the default.
pub trait LedgerStore: Send + Sync {
    /// Identifiers already recommended in this session. Unknown sessions
    /// yield an empty set.
    fn get(&self, session_id: &str) -> HashSet<String>;

    /// Record an identifier for the session. Idempotent: appending the
    /// same identifier twice leaves the set unchanged.
    fn append(&self, session_id: &str, identifier: &str);
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedLedger {
    updated_at: DateTime<Utc>,
    sessions: HashMap<String, Vec<String>>,
}

/// In-memory ledger with best-effort JSON file persistence, so restarts
/// within a conversation's lifetime do not repeat recommendations.
pub struct InMemoryLedger {
    sessions: DashMap<String, HashSet<String>>,
    path: Option<PathBuf>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            path: None,
        }
    }

    /// Persisting variant. A missing or corrupt file starts fresh.
    pub fn with_persistence(path: PathBuf) -> Self {
        let ledger = Self {
            sessions: DashMap::new(),
            path: Some(path),
        };
        ledger.load_from_disk();
        ledger
    }

    fn load_from_disk(&self) {
        let Some(path) = &self.path else { return };
        if !path.exists() {
            return;
        }
        let json = match std::fs::read_to_string(path) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read ledger file, starting fresh");
                return;
            }
        };
        let data: PersistedLedger = match serde_json::from_str(&json) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "corrupt ledger file, starting fresh");
                return;
            }
        };
        for (session, ids) in data.sessions {
            self.sessions.insert(session, ids.into_iter().collect());
        }
    }

    fn persist_to_disk(&self) {
        let Some(path) = &self.path else { return };
        let data = PersistedLedger {
            updated_at: Utc::now(),
            sessions: self
                .sessions
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
                .collect(),
        };
        let json = match serde_json::to_string(&data) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "ledger serialization failed");
                return;
            }
        };
        if let Err(e) = std::fs::write(path, json) {
            tracing::warn!(error = %e, "ledger persist failed");
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for InMemoryLedger {
    fn get(&self, session_id: &str) -> HashSet<String> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn append(&self, session_id: &str, identifier: &str) {
        let inserted = self
            .sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(identifier.to_string());
        if inserted {
            self.persist_to_disk();
        }
    }
}
