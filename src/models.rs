//! Core data models used throughout Dossier.
//!
//! These types represent the documents, chunks, and vector records that
//! flow through the ingestion pipeline, and the citations and reports
//! handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One loaded source document, produced by the loader from a single file.
/// Immutable once built; never persisted directly — only its chunks are.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub filename: String,
    pub filepath: PathBuf,
    pub source_dir: PathBuf,
    /// Extracted text, trimmed.
    pub text: String,
    /// Short content hash (SHA-256, first 12 hex chars) for provenance.
    pub content_hash: String,
    /// Length of the extracted text in bytes.
    pub size: usize,
    pub modified: DateTime<Utc>,
}

/// Provenance metadata persisted alongside each chunk's vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub source_dir: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content_hash: String,
    pub doc_modified: DateTime<Utc>,
}

/// One vector ready to be written to the store.
///
/// `id` is a zero-padded sequence number, offset by the pre-existing
/// collection size on incremental ingest so appended IDs never collide
/// with stored ones (single-writer assumption).
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A record fetched back from the store without score information.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One nearest-neighbor result from a similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Distance reported by the store (cosine distance for the default
    /// metric). Smaller is closer.
    pub distance: f64,
}

impl SearchHit {
    /// Similarity exposed to callers: `1 − distance`.
    ///
    /// Only guaranteed to lie in `[0, 1]` for a cosine-style metric;
    /// callers must not assume the bound for other metrics.
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// A source citation attached to an answer.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub filename: String,
    pub chunk_index: usize,
    /// Similarity rounded to 4 decimals.
    pub similarity: f64,
    /// First 200 characters of the chunk, with "..." appended when truncated.
    pub preview: String,
}

/// Token accounting reported by the generation capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// The result of one retrieval query. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Citation>,
    pub usage: TokenUsage,
}

/// Statistics returned by one ingest call.
///
/// Token and cost figures are coarse estimates (`chars / 4`, a fixed
/// per-token rate), advisory only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub tokens_est: u64,
    pub cost_est: f64,
    /// Total vectors in the collection after this ingest.
    pub total_indexed: u64,
    /// Set when the ingest was a no-op (e.g. zero documents found);
    /// the pipeline returns `Ok` with this message instead of an error.
    pub notice: Option<String>,
}

impl IngestReport {
    /// A no-op report carrying an explanatory message.
    pub fn empty(notice: impl Into<String>) -> Self {
        IngestReport {
            notice: Some(notice.into()),
            ..Default::default()
        }
    }
}
