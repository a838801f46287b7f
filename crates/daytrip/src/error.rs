use crate::types::DocKind;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal startup failures. Anything hit after startup degrades in place
/// (empty results, apology text) instead of surfacing an error, so only
/// construction-time problems get a typed variant.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("corpus snapshot not found: {}", .0.display())]
    MissingSnapshot(PathBuf),

    #[error("corpus snapshot {} is unreadable: {source}", .path.display())]
    BadSnapshot {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("corpus snapshot for {kind:?} contains no documents")]
    EmptyCorpus { kind: DocKind },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),
}
