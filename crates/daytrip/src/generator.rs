//! Response generation: formats retrieval output into a prompt, invokes
//! the text-generation service once, and extracts the place names the
//! answer actually mentioned so the ledger can learn them.
//!
//! Best-effort by contract: a short or miscounted answer is accepted
//! as-is, and any generation failure resolves to an apology string.

use std::collections::HashSet;
use std::sync::Arc;

use crate::extract::{scan_answer_places, Chain};
use crate::llm::TextGenerator;
use crate::templates;
use crate::types::{GeneratedAnswer, PlaceResult, ScoredDocument};

pub struct ResponseGenerator {
    llm: Arc<dyn TextGenerator>,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    pub async fn respond(
        &self,
        question: &str,
        docs: &[ScoredDocument],
        places: &[PlaceResult],
        excluded: &HashSet<String>,
        is_event: bool,
    ) -> GeneratedAnswer {
        let excluded_names: Vec<String> = excluded.iter().cloned().collect();
        let user_prompt = if is_event {
            templates::event_prompt(question, docs, &excluded_names)
        } else {
            templates::general_prompt(question, docs, places, &excluded_names)
        };

        let answer = match self.llm.generate(templates::SYSTEM_PROMPT, &user_prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!("generation returned empty text, using apology fallback");
                return GeneratedAnswer {
                    text: templates::apology(question),
                    mentioned: Vec::new(),
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "generation failed, using apology fallback");
                return GeneratedAnswer {
                    text: templates::GENERATION_ERROR_APOLOGY.to_string(),
                    mentioned: Vec::new(),
                };
            }
        };

        let mentioned = mentioned_identifiers(&answer, docs, places);
        tracing::debug!(count = mentioned.len(), "places mentioned in answer");
        GeneratedAnswer {
            text: answer,
            mentioned,
        }
    }
}

/// Map the names the answer mentions back to stable identifiers: corpus
/// documents contribute their dedup identifier, external places their
/// title. Names that match no source are dropped — the ledger only tracks
/// things we can recognize again.
fn mentioned_identifiers(
    answer: &str,
    docs: &[ScoredDocument],
    places: &[PlaceResult],
) -> Vec<String> {
    let name_chain = Chain::name();
    let doc_names: Vec<(String, String)> = docs
        .iter()
        .map(|d| (name_chain.extract(&d.doc), d.doc.identifier()))
        .collect();

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for name in scan_answer_places(answer) {
        let lower = name.to_lowercase();
        let id = doc_names
            .iter()
            .find(|(n, _)| {
                let n = n.to_lowercase();
                n == lower || n.contains(&lower) || lower.contains(&n)
            })
            .map(|(_, id)| id.clone())
            .or_else(|| {
                places
                    .iter()
                    .find(|p| {
                        let t = p.title.to_lowercase();
                        t == lower || t.contains(&lower) || lower.contains(&t)
                    })
                    .map(|p| p.title.clone())
            });
        if let Some(id) = id {
            if seen.insert(id.clone()) {
                out.push(id);
            }
        }
    }
    out
}
