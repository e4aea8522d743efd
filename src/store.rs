//! Vector persistence and similarity search.
//!
//! [`VectorStore`] is the storage seam: [`SqliteStore`] is the production
//! backend (one SQLite file, WAL mode, vectors as little-endian f32
//! BLOBs), [`MemoryStore`] backs tests.
//!
//! Search is a brute-force cosine scan over the collection. Distances are
//! reported as `1 - cosine_similarity`, smaller meaning closer, so that
//! callers can recover similarity as `1 - distance`.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{EngineError, Result};
use crate::models::{ChunkMetadata, SearchHit, StoredRecord, VectorRecord};

/// Hard ceiling on records per write statement batch. Larger ingests are
/// split transparently.
pub const WRITE_BATCH_LIMIT: usize = 5000;

/// Distance function attached to a collection at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
        }
    }
}

/// Named-collection vector storage.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent; no-op if it already exists.
    async fn ensure_collection(&self, name: &str, metric: DistanceMetric) -> Result<()>;

    /// Drop the collection if present, then create it empty. A failed
    /// delete of a missing collection is not an error.
    async fn replace_collection(&self, name: &str, metric: DistanceMetric) -> Result<()>;

    /// Insert records, splitting into sub-batches of at most
    /// [`WRITE_BATCH_LIMIT`]. IDs already present are overwritten.
    async fn append(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Top-k nearest records by ascending distance. Fails with
    /// [`EngineError::EmptyIndex`] when the collection is missing or
    /// holds no vectors.
    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Number of vectors in the collection; 0 when it does not exist.
    async fn count(&self, collection: &str) -> Result<u64>;

    /// A page of records ordered by id, without embeddings.
    async fn fetch(&self, collection: &str, limit: u64, offset: u64) -> Result<Vec<StoredRecord>>;

    /// Drop the collection and its vectors. Succeeds when absent.
    async fn delete_collection(&self, name: &str) -> Result<()>;
}

/// First `limit` records by id. Convenience over [`VectorStore::fetch`].
pub async fn peek(store: &dyn VectorStore, collection: &str, limit: u64) -> Result<Vec<StoredRecord>> {
    store.fetch(collection, limit, 0).await
}

fn rank_hits(
    query: &[f32],
    rows: impl Iterator<Item = (String, Vec<f32>, String, ChunkMetadata)>,
    k: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = rows
        .map(|(id, embedding, text, metadata)| {
            let distance = 1.0 - cosine_similarity(query, &embedding) as f64;
            SearchHit {
                id,
                text,
                metadata,
                distance,
            }
        })
        .collect();
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits.truncate(k);
    hits
}

// ============ SQLite backend ============

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run the
    /// schema migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(EngineError::Store)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name        TEXT PRIMARY KEY,
                metric      TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                collection  TEXT NOT NULL,
                id          TEXT NOT NULL,
                embedding   BLOB NOT NULL,
                text        TEXT NOT NULL,
                metadata    TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ensure_collection(&self, name: &str, metric: DistanceMetric) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, metric, created_at) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(metric.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_collection(&self, name: &str, metric: DistanceMetric) -> Result<()> {
        if let Err(e) = self.delete_collection(name).await {
            tracing::warn!(collection = name, error = %e, "delete before replace failed");
        }
        self.ensure_collection(name, metric).await
    }

    async fn append(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        for batch in records.chunks(WRITE_BATCH_LIMIT) {
            let mut tx = self.pool.begin().await?;
            for record in batch {
                let metadata = serde_json::to_string(&record.metadata)?;
                sqlx::query(
                    "INSERT OR REPLACE INTO vectors (collection, id, embedding, text, metadata) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(collection)
                .bind(&record.id)
                .bind(vec_to_blob(&record.embedding))
                .bind(&record.text)
                .bind(metadata)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            tracing::debug!(collection, written = batch.len(), "vector batch committed");
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if !self.collection_exists(collection).await? || self.count(collection).await? == 0 {
            return Err(EngineError::EmptyIndex(collection.to_string()));
        }

        let rows = sqlx::query("SELECT id, embedding, text, metadata FROM vectors WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut decoded = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let text: String = row.get("text");
            let metadata_json: String = row.get("metadata");
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)?;
            decoded.push((id, blob_to_vec(&blob), text, metadata));
        }

        Ok(rank_hits(query, decoded.into_iter(), k))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM vectors WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    async fn fetch(&self, collection: &str, limit: u64, offset: u64) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, text, metadata FROM vectors WHERE collection = ? \
             ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(collection)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata");
            records.push(StoredRecord {
                id: row.get("id"),
                text: row.get("text"),
                metadata: serde_json::from_str(&metadata_json)?,
            });
        }
        Ok(records)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vectors WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

// ============ In-memory backend ============

#[derive(Default)]
struct MemoryCollection {
    records: Vec<VectorRecord>,
}

/// Test double, also usable for throwaway sessions. Same contract as
/// [`SqliteStore`], no persistence.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, name: &str, _metric: DistanceMetric) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn replace_collection(&self, name: &str, _metric: DistanceMetric) -> Result<()> {
        self.collections
            .write()
            .await
            .insert(name.to_string(), MemoryCollection::default());
        Ok(())
    }

    async fn append(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut guard = self.collections.write().await;
        let coll = guard.entry(collection.to_string()).or_default();
        for record in records {
            if let Some(existing) = coll.records.iter_mut().find(|r| r.id == record.id) {
                *existing = record;
            } else {
                coll.records.push(record);
            }
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let guard = self.collections.read().await;
        let coll = guard
            .get(collection)
            .filter(|c| !c.records.is_empty())
            .ok_or_else(|| EngineError::EmptyIndex(collection.to_string()))?;

        Ok(rank_hits(
            query,
            coll.records
                .iter()
                .map(|r| (r.id.clone(), r.embedding.clone(), r.text.clone(), r.metadata.clone())),
            k,
        ))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).map(|c| c.records.len() as u64).unwrap_or(0))
    }

    async fn fetch(&self, collection: &str, limit: u64, offset: u64) -> Result<Vec<StoredRecord>> {
        let guard = self.collections.read().await;
        let mut records: Vec<StoredRecord> = guard
            .get(collection)
            .map(|c| {
                c.records
                    .iter()
                    .map(|r| StoredRecord {
                        id: r.id.clone(),
                        text: r.text.clone(),
                        metadata: r.metadata.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }
}
