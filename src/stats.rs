//! Index inspection: collection stats and indexed-file listing.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::store::{peek, VectorStore};

/// Records fetched per page when walking the whole collection.
const FETCH_PAGE: u64 = 1000;

/// Snapshot of the collection for `dossier stats`.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub total_chunks: u64,
    pub db_size_mb: f64,
    /// Distinct filenames among the first 100 records, sorted.
    pub sample_files: Vec<String>,
}

pub async fn collection_stats(config: &Config, store: &dyn VectorStore) -> Result<CollectionStats> {
    let collection = config.store.collection.clone();
    let total_chunks = store.count(&collection).await?;

    let sample_files: BTreeSet<String> = peek(store, &collection, 100)
        .await?
        .into_iter()
        .map(|r| r.metadata.filename)
        .collect();

    Ok(CollectionStats {
        collection,
        total_chunks,
        db_size_mb: db_size_mb(&config.store.path),
        sample_files: sample_files.into_iter().collect(),
    })
}

/// Every distinct filename in the collection, sorted, via full paginated
/// walk of the stored metadata.
pub async fn list_indexed_files(config: &Config, store: &dyn VectorStore) -> Result<Vec<String>> {
    let collection = &config.store.collection;
    let mut names = BTreeSet::new();
    let mut offset = 0u64;
    loop {
        let page = store.fetch(collection, FETCH_PAGE, offset).await?;
        let got = page.len() as u64;
        for record in page {
            names.insert(record.metadata.filename);
        }
        if got < FETCH_PAGE {
            break;
        }
        offset += got;
    }
    Ok(names.into_iter().collect())
}

fn db_size_mb(path: &Path) -> f64 {
    std::fs::metadata(path)
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}
