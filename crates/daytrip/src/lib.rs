//! Conversational place and event recommendation core.
//!
//! A turn flows through three stages: query analysis (district, category
//! and minor-preference keywords), hybrid retrieval over local corpus
//! snapshots joined with a live local-search lookup, and prompt-templated
//! answer generation. A per-session ledger keeps repeat questions from
//! recommending the same places twice.

pub mod analyzer;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generator;
pub mod ledger;
pub mod llm;
pub mod naver;
pub mod retriever;
pub mod store;
pub mod templates;
pub mod types;

// Re-export primary types for convenience
pub use config::EngineConfig;
pub use engine::ChatEngine;
pub use error::StartupError;
pub use types::{
    DocKind, Document, GeneratedAnswer, PlaceResult, QueryFilters, ScoredDocument,
};

pub use analyzer::analyze;

// Re-export common types
pub use anyhow::{Error, Result};
