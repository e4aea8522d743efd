//! Error taxonomy for the ingestion and retrieval pipelines.
//!
//! Callers need to tell apart three failure families: local problems
//! (missing manifest, bad configuration), missing credentials before any
//! remote call is attempted, and remote call failures. Retrieval against
//! a collection that has never been populated is its own variant so a
//! front-end can render "nothing has been ingested yet" instead of a
//! generic error.
//!
//! Per-file problems during loading (unsupported format, empty
//! extraction) are *not* errors — they are logged and the file is
//! skipped. A load that finds zero documents produces a no-op
//! [`IngestReport`](crate::models::IngestReport), not an `Err`.

use thiserror::Error;

/// Which remote capability a failed call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Embedding,
    Generation,
}

impl std::fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteKind::Embedding => write!(f, "embedding"),
            RemoteKind::Generation => write!(f, "generation"),
        }
    }
}

/// Errors surfaced by the core pipelines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A named input (manifest file, document by id) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid configuration or invalid pipeline input.
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable API key in the config file or the environment.
    /// Checked before any remote call is attempted.
    #[error("API key missing: set MISTRAL_API_KEY or [api] key in the config file")]
    MissingApiKey,

    /// The queried collection does not exist or holds zero vectors.
    #[error("collection '{0}' has no indexed documents — run `dossier ingest` first")]
    EmptyIndex(String),

    /// A remote embedding or generation call failed after any configured
    /// retries. `status` is the last HTTP status, if the request got that far.
    #[error("{kind} call failed{}: {message}", .status.as_ref().map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Remote {
        kind: RemoteKind,
        status: Option<u16>,
        message: String,
    },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Convenience constructor for a failed remote call.
    pub fn remote(kind: RemoteKind, status: Option<u16>, message: impl Into<String>) -> Self {
        EngineError::Remote {
            kind,
            status,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
