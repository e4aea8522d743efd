//! Ingest pipeline: load, chunk, embed, store.
//!
//! [`run_ingest`] is the single entry point. A fresh run replaces the
//! collection before writing; an append run keeps existing vectors and
//! offsets new chunk ids past the current count so re-running the same
//! sources in append mode never clobbers earlier ids.
//!
//! Empty outcomes (no documents, no chunks above the minimum length) are
//! not errors; they produce an [`IngestReport`] carrying a notice so the
//! store is left untouched.

use std::path::PathBuf;

use crate::chunk::chunk_documents;
use crate::config::Config;
use crate::embedding::{embed_in_batches, EmbeddingClient};
use crate::error::Result;
use crate::extract::ExtractorRegistry;
use crate::loader::{load_manifest, load_paths};
use crate::models::{IngestReport, VectorRecord};
use crate::progress::{IngestEvent, IngestStage, ProgressReporter};
use crate::store::{DistanceMetric, VectorStore};

/// Cost per million tokens charged by the embedding endpoint, in EUR.
const EMBED_COST_PER_MILLION: f64 = 0.10;

/// Where an ingest run reads its documents from.
#[derive(Debug, Clone)]
pub enum IngestSource {
    /// Files and directories given directly.
    Paths(Vec<PathBuf>),
    /// A manifest file listing one path per line.
    Manifest(PathBuf),
}

pub async fn run_ingest(
    config: &Config,
    embedder: &dyn EmbeddingClient,
    store: &dyn VectorStore,
    source: IngestSource,
    append: bool,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let registry = ExtractorRegistry::new();
    let collection = &config.store.collection;

    progress.report(IngestEvent::Stage {
        stage: IngestStage::Load,
        detail: String::new(),
    });
    let documents = match &source {
        IngestSource::Paths(paths) => load_paths(&registry, paths)?,
        IngestSource::Manifest(path) => load_manifest(&registry, path)?,
    };
    if documents.is_empty() {
        tracing::warn!("no usable documents, store left untouched");
        return Ok(IngestReport::empty("no usable documents found"));
    }

    progress.report(IngestEvent::Stage {
        stage: IngestStage::Chunk,
        detail: format!("{} documents", documents.len()),
    });
    let (chunks, metadata) = chunk_documents(&documents, &config.chunking);
    if chunks.is_empty() {
        tracing::warn!("all content below minimum chunk length, store left untouched");
        return Ok(IngestReport::empty(
            "no chunks above the minimum length, nothing indexed",
        ));
    }

    let total_chars: usize = chunks.iter().map(|c| c.len()).sum();
    let tokens_est = (total_chars / 4) as u64;
    let cost_est = tokens_est as f64 * EMBED_COST_PER_MILLION / 1_000_000.0;

    progress.report(IngestEvent::Stage {
        stage: IngestStage::Embed,
        detail: format!("{} chunks, ~{} tokens", chunks.len(), tokens_est),
    });
    let batch_size = config.embedding.batch_size.max(1);
    let total_batches = chunks.len().div_ceil(batch_size);
    let mut embeddings = Vec::with_capacity(chunks.len());
    for (i, batch) in chunks.chunks(batch_size).enumerate() {
        progress.report(IngestEvent::EmbedBatch {
            n: i + 1,
            total: total_batches,
        });
        embeddings.extend(embed_in_batches(embedder, batch, batch_size).await?);
    }

    progress.report(IngestEvent::Stage {
        stage: IngestStage::Store,
        detail: collection.clone(),
    });
    if !append {
        store.replace_collection(collection, DistanceMetric::Cosine).await?;
    }
    store.ensure_collection(collection, DistanceMetric::Cosine).await?;

    // Fresh runs start ids at zero; append runs continue past the
    // existing vectors.
    let offset = if append {
        store.count(collection).await? as usize
    } else {
        0
    };

    let records: Vec<VectorRecord> = chunks
        .into_iter()
        .zip(metadata)
        .zip(embeddings)
        .enumerate()
        .map(|(i, ((text, meta), embedding))| VectorRecord {
            id: format!("chunk_{:06}", offset + i),
            embedding,
            text,
            metadata: meta,
        })
        .collect();
    let written = records.len();
    store.append(collection, records).await?;

    let total_indexed = store.count(collection).await?;
    progress.report(IngestEvent::Stage {
        stage: IngestStage::Done,
        detail: format!("{} vectors indexed", total_indexed),
    });
    tracing::info!(
        documents = documents.len(),
        chunks = written,
        total_indexed,
        append,
        "ingest complete"
    );

    Ok(IngestReport {
        documents: documents.len(),
        chunks: written,
        tokens_est,
        cost_est,
        total_indexed,
        notice: None,
    })
}
