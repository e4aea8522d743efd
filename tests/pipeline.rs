//! End-to-end pipeline tests with deterministic stub clients.

use std::fs;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use dossier::config::Config;
use dossier::embedding::{ChatClient, Completion, EmbeddingClient};
use dossier::error::{EngineError, Result};
use dossier::ingest::{run_ingest, IngestSource};
use dossier::models::TokenUsage;
use dossier::progress::NoProgress;
use dossier::query::run_query;
use dossier::store::{MemoryStore, VectorStore};

/// Deterministic embedder: the vector is a pure function of the text, so
/// order preservation through batching is observable in the stored records.
struct StubEmbedder;

fn stub_vector(text: &str) -> Vec<f32> {
    let sum: u32 = text.bytes().map(u32::from).sum();
    vec![text.len() as f32, (sum % 997) as f32]
}

#[async_trait]
impl EmbeddingClient for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| stub_vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "stub-embed"
    }
}

/// Records the last user prompt so tests can inspect the assembled context.
struct StubChat {
    last_prompt: Mutex<Option<String>>,
}

impl StubChat {
    fn new() -> Self {
        Self {
            last_prompt: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChatClient for StubChat {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<Completion> {
        *self.last_prompt.lock().unwrap() = Some(user_prompt.to_string());
        Ok(Completion {
            text: "Risposta di prova.".to_string(),
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            },
        })
    }
}

fn write_docs(dir: &TempDir) {
    fs::write(
        dir.path().join("ferie.txt"),
        "La policy ferie prevede venticinque giorni annui per ogni dipendente a tempo pieno.",
    )
    .unwrap();
    fs::write(
        dir.path().join("rimborsi.md"),
        "I rimborsi spese vanno richiesti entro trenta giorni dalla data della trasferta aziendale.",
    )
    .unwrap();
}

#[tokio::test]
async fn fresh_ingest_then_query_cites_sources() {
    let dir = TempDir::new().unwrap();
    write_docs(&dir);

    let config = Config::default();
    let store = MemoryStore::new();

    let report = run_ingest(
        &config,
        &StubEmbedder,
        &store,
        IngestSource::Paths(vec![dir.path().to_path_buf()]),
        false,
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(report.documents, 2);
    assert_eq!(report.chunks, 2);
    assert_eq!(report.total_indexed, 2);
    assert!(report.notice.is_none());
    assert!(report.tokens_est > 0);

    // Ids start at zero and each stored vector matches its own text.
    let records = store.fetch(&config.store.collection, 10, 0).await.unwrap();
    assert_eq!(records[0].id, "chunk_000000");
    assert_eq!(records[1].id, "chunk_000001");

    let chat = StubChat::new();
    let response = run_query(
        &config,
        &StubEmbedder,
        &chat,
        &store,
        "Quanti giorni di ferie?",
        None,
    )
    .await
    .unwrap();

    assert_eq!(response.answer, "Risposta di prova.");
    assert_eq!(response.sources.len(), 2);
    assert!(response.sources.iter().all(|s| s.similarity <= 1.0));
    assert_eq!(response.usage.total_tokens, 120);

    let prompt = chat.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("Contesto dai documenti aziendali:\n---------------------\n"));
    assert!(prompt.contains("[Fonte: ferie.txt, sezione 0]"));
    assert!(prompt.contains("\n---------------------\n\nDomanda:"));
    assert!(prompt.contains("Domanda: Quanti giorni di ferie?"));
    assert!(prompt.contains("Rispondi basandoti solo sul contesto fornito sopra."));
}

#[tokio::test]
async fn append_offsets_ids_past_existing_vectors() {
    let dir_a = TempDir::new().unwrap();
    fs::write(
        dir_a.path().join("primo.txt"),
        "Documento iniziale con abbastanza testo da superare la soglia minima del chunker.",
    )
    .unwrap();
    let dir_b = TempDir::new().unwrap();
    fs::write(
        dir_b.path().join("secondo.txt"),
        "Documento aggiunto in seguito, anche questo sopra la soglia minima di lunghezza.",
    )
    .unwrap();

    let config = Config::default();
    let store = MemoryStore::new();

    run_ingest(
        &config,
        &StubEmbedder,
        &store,
        IngestSource::Paths(vec![dir_a.path().to_path_buf()]),
        false,
        &NoProgress,
    )
    .await
    .unwrap();

    let report = run_ingest(
        &config,
        &StubEmbedder,
        &store,
        IngestSource::Paths(vec![dir_b.path().to_path_buf()]),
        true,
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(report.total_indexed, 2);
    let records = store.fetch(&config.store.collection, 10, 0).await.unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["chunk_000000", "chunk_000001"]);

    let first = records.iter().find(|r| r.id == "chunk_000000").unwrap();
    let second = records.iter().find(|r| r.id == "chunk_000001").unwrap();
    assert_eq!(first.metadata.filename, "primo.txt");
    assert_eq!(second.metadata.filename, "secondo.txt");
}

#[tokio::test]
async fn fresh_ingest_replaces_previous_collection() {
    let dir_a = TempDir::new().unwrap();
    fs::write(
        dir_a.path().join("vecchio.txt"),
        "Contenuto della prima indicizzazione, sufficientemente lungo per un chunk valido.",
    )
    .unwrap();
    let dir_b = TempDir::new().unwrap();
    fs::write(
        dir_b.path().join("nuovo.txt"),
        "Contenuto della seconda indicizzazione, anche questo abbastanza lungo da contare.",
    )
    .unwrap();

    let config = Config::default();
    let store = MemoryStore::new();

    for (dir, append) in [(&dir_a, false), (&dir_b, false)] {
        run_ingest(
            &config,
            &StubEmbedder,
            &store,
            IngestSource::Paths(vec![dir.path().to_path_buf()]),
            append,
            &NoProgress,
        )
        .await
        .unwrap();
    }

    let records = store.fetch(&config.store.collection, 10, 0).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata.filename, "nuovo.txt");
}

#[tokio::test]
async fn empty_sources_leave_store_untouched() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("breve.txt"), "corto").unwrap();

    let config = Config::default();
    let store = MemoryStore::new();

    // Below the minimum chunk length, so nothing is indexed.
    let report = run_ingest(
        &config,
        &StubEmbedder,
        &store,
        IngestSource::Paths(vec![dir.path().to_path_buf()]),
        false,
        &NoProgress,
    )
    .await
    .unwrap();

    assert!(report.notice.is_some());
    assert_eq!(report.total_indexed, 0);
    assert_eq!(store.count(&config.store.collection).await.unwrap(), 0);
}

#[tokio::test]
async fn manifest_drives_ingest_sources() {
    let docs = TempDir::new().unwrap();
    fs::write(
        docs.path().join("contratto.txt"),
        "Il contratto standard ha durata annuale con rinnovo tacito salvo disdetta scritta.",
    )
    .unwrap();

    let manifest_dir = TempDir::new().unwrap();
    let manifest = manifest_dir.path().join("sources.txt");
    fs::write(
        &manifest,
        format!("# fonti\n\n{}\n", docs.path().display()),
    )
    .unwrap();

    let config = Config::default();
    let store = MemoryStore::new();

    let report = run_ingest(
        &config,
        &StubEmbedder,
        &store,
        IngestSource::Manifest(manifest),
        false,
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.total_indexed, 1);
}

#[tokio::test]
async fn missing_manifest_is_not_found() {
    let config = Config::default();
    let store = MemoryStore::new();

    let err = run_ingest(
        &config,
        &StubEmbedder,
        &store,
        IngestSource::Manifest("/nonexistent/sources.txt".into()),
        false,
        &NoProgress,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn query_on_empty_index_reports_collection() {
    let config = Config::default();
    let store = MemoryStore::new();
    let chat = StubChat::new();

    let err = run_query(&config, &StubEmbedder, &chat, &store, "Domanda?", None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::EmptyIndex(ref c) if c == &config.store.collection));
    // The chat model is never reached.
    assert!(chat.last_prompt.lock().unwrap().is_none());
}

#[tokio::test]
async fn top_k_override_limits_citations() {
    let dir = TempDir::new().unwrap();
    for i in 0..3 {
        fs::write(
            dir.path().join(format!("doc{}.txt", i)),
            format!("Documento numero {} con testo sufficiente a produrre un chunk intero.", i),
        )
        .unwrap();
    }

    let config = Config::default();
    let store = MemoryStore::new();
    run_ingest(
        &config,
        &StubEmbedder,
        &store,
        IngestSource::Paths(vec![dir.path().to_path_buf()]),
        false,
        &NoProgress,
    )
    .await
    .unwrap();

    let chat = StubChat::new();
    let response = run_query(&config, &StubEmbedder, &chat, &store, "Quale documento?", Some(1))
        .await
        .unwrap();
    assert_eq!(response.sources.len(), 1);
}
