//! Turn orchestration: Analyze → {Retrieve ∥ ExternalSearch} → Generate.
//!
//! One logical task per turn. Turns from different sessions run fully in
//! parallel; turns within one session are serialized behind a per-session
//! mutex so the ledger's append-only invariant holds. Every failure mode
//! below this point resolves to answer text — nothing here terminates a
//! conversation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::analyzer;
use crate::config::EngineConfig;
use crate::embedding::{ApiEmbedder, Embedder};
use crate::error::StartupError;
use crate::generator::ResponseGenerator;
use crate::ledger::{InMemoryLedger, LedgerStore};
use crate::llm::OpenAiGenerator;
use crate::naver::{NaverLocalClient, PlaceSearch};
use crate::retriever::HybridRetriever;
use crate::store::KnowledgeStore;
use crate::types::TurnState;

/// Aborts the wrapped task when dropped, so the periodic status messages
/// stop on every exit path of a turn.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct ChatEngine {
    retriever: HybridRetriever,
    search: Arc<dyn PlaceSearch>,
    generator: ResponseGenerator,
    ledger: Arc<dyn LedgerStore>,
    session_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    status_interval: Duration,
}

impl ChatEngine {
    pub fn new(
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        generator: ResponseGenerator,
        search: Arc<dyn PlaceSearch>,
        ledger: Arc<dyn LedgerStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            retriever: HybridRetriever::new(store, embedder, config.search.clone()),
            search,
            generator,
            ledger,
            session_locks: DashMap::new(),
            status_interval: Duration::from_secs(4),
        }
    }

    /// Wire up all real services from config + environment. Fails fast on
    /// a missing corpus or generation credential; absent Naver credentials
    /// merely disable the external adapter.
    pub fn from_config(config: &EngineConfig) -> Result<Self, StartupError> {
        config
            .validate()
            .map_err(StartupError::InvalidConfig)?;

        let store = Arc::new(KnowledgeStore::open(&config.data_dir)?);
        let embedder = Arc::new(ApiEmbedder::from_env(&config.embedding)?);
        let llm = Arc::new(OpenAiGenerator::from_env(config.generation.clone())?);
        let search = Arc::new(
            NaverLocalClient::from_env(config.external.clone())
                .map_err(|e| StartupError::InvalidConfig(format!("local search client: {}", e)))?,
        );
        let ledger = Arc::new(InMemoryLedger::with_persistence(
            config.data_dir.join("ledger.json"),
        ));

        Ok(Self::new(
            store,
            embedder,
            ResponseGenerator::new(llm),
            search,
            ledger,
            config,
        ))
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Handle one turn: always returns answer text, never an error.
    pub async fn handle_turn(&self, session_id: &str, question: &str) -> String {
        let lock = self.session_lock(session_id);
        let answer = {
            let _turn_guard = lock.lock().await;
            self.run_turn(session_id, question).await
        };
        drop(lock);

        // Evict the lock entry unless another turn for this session still
        // holds a clone; a later turn simply recreates it.
        self.session_locks
            .remove_if(session_id, |_, entry| Arc::strong_count(entry) == 1);

        answer
    }

    async fn run_turn(&self, session_id: &str, question: &str) -> String {
        let turn_id = Uuid::new_v4();
        tracing::info!(%turn_id, session_id, "turn started");

        let filters = analyzer::analyze(question);
        let excluded: HashSet<String> = self.ledger.get(session_id);

        // Retrieval and external search are independent read-only calls;
        // fan out and join before generation. Either side may legally come
        // back empty.
        let (retrieved, external) = tokio::join!(
            self.retriever.retrieve(question, &filters, &excluded),
            self.search.search(question, &filters),
        );
        tracing::info!(
            %turn_id,
            retrieved = retrieved.len(),
            external = external.len(),
            "search joined"
        );

        let mut turn = TurnState {
            session_id: session_id.to_string(),
            question: question.to_string(),
            filters,
            retrieved,
            external,
            answer: String::new(),
        };

        let generated = self
            .generator
            .respond(
                &turn.question,
                &turn.retrieved,
                &turn.external,
                &excluded,
                turn.filters.is_event,
            )
            .await;
        turn.answer = generated.text;

        // Ledger updates apply only after the turn fully completed, so a
        // cancelled turn never leaves a half-recorded recommendation.
        for identifier in &generated.mentioned {
            self.ledger.append(session_id, identifier);
        }
        tracing::info!(%turn_id, mentioned = generated.mentioned.len(), "turn finished");

        turn.answer
    }

    /// Like `handle_turn`, but emits periodic "still thinking" messages on
    /// the channel while the real answer is being produced. The status
    /// task is aborted on every exit path.
    pub async fn handle_turn_with_status(
        &self,
        session_id: &str,
        question: &str,
        status: mpsc::Sender<String>,
    ) -> String {
        let interval = self.status_interval;
        let _status_task = AbortOnDrop(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                ticker.tick().await;
                if status
                    .send("잠시만요, 딱 맞는 곳을 찾고 있어요...".to_string())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }));

        self.handle_turn(session_id, question).await
    }
}
