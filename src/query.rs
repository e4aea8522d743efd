//! Question answering over the indexed collection.
//!
//! [`run_query`] embeds the question, pulls the top-k nearest chunks,
//! assembles a delimited context with per-chunk source headers, and asks
//! the chat model to answer from that context alone. Every retrieved
//! chunk comes back as a [`Citation`] so callers can show provenance.

use crate::config::Config;
use crate::embedding::{embed_query, ChatClient, EmbeddingClient};
use crate::error::Result;
use crate::models::{Citation, QueryResponse, SearchHit};
use crate::store::VectorStore;

/// Separates context blocks in the prompt.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Characters of chunk text kept in a citation preview.
pub const PREVIEW_LEN: usize = 200;

pub async fn run_query(
    config: &Config,
    embedder: &dyn EmbeddingClient,
    chat: &dyn ChatClient,
    store: &dyn VectorStore,
    question: &str,
    top_k: Option<usize>,
) -> Result<QueryResponse> {
    let k = top_k.unwrap_or(config.retrieval.top_k);
    tracing::info!(k, "retrieving context");

    let query_vec = embed_query(embedder, question).await?;
    let hits = store.search(&config.store.collection, &query_vec, k).await?;
    tracing::info!(hits = hits.len(), "context retrieved");

    let context = assemble_context(&hits);
    let sources: Vec<Citation> = hits.iter().map(citation_for).collect();

    let user_prompt = format!(
        "Contesto dai documenti aziendali:\n---------------------\n{}\n---------------------\n\nDomanda: {}\n\nRispondi basandoti solo sul contesto fornito sopra.",
        context, question
    );
    let completion = chat.complete(&config.chat.system_prompt, &user_prompt).await?;

    Ok(QueryResponse {
        answer: completion.text,
        sources,
        usage: completion.usage,
    })
}

/// Each chunk is prefixed with a source header naming its file and
/// section, so the model can cite them in the answer.
fn assemble_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "[Fonte: {}, sezione {}]\n{}",
                hit.metadata.filename, hit.metadata.chunk_index, hit.text
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

fn citation_for(hit: &SearchHit) -> Citation {
    Citation {
        filename: hit.metadata.filename.clone(),
        chunk_index: hit.metadata.chunk_index,
        similarity: (hit.similarity() * 10_000.0).round() / 10_000.0,
        preview: preview_of(&hit.text),
    }
}

/// First [`PREVIEW_LEN`] characters, cut on a char boundary, with "..."
/// appended only when the text was actually truncated.
fn preview_of(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn hit(filename: &str, chunk_index: usize, text: &str, distance: f64) -> SearchHit {
        SearchHit {
            id: format!("chunk_{:06}", chunk_index),
            text: text.to_string(),
            metadata: ChunkMetadata {
                filename: filename.to_string(),
                source_dir: "docs".to_string(),
                chunk_index,
                total_chunks: 5,
                content_hash: "abc123def456".to_string(),
                doc_modified: "2026-01-15T10:00:00Z".parse().unwrap(),
            },
            distance,
        }
    }

    #[test]
    fn context_headers_and_delimiter() {
        let hits = vec![
            hit("manuale.txt", 0, "Prima sezione.", 0.1),
            hit("policy.md", 3, "Seconda sezione.", 0.2),
        ];
        let context = assemble_context(&hits);
        assert!(context.starts_with("[Fonte: manuale.txt, sezione 0]\nPrima sezione."));
        assert!(context.contains(CONTEXT_DELIMITER));
        assert!(context.ends_with("[Fonte: policy.md, sezione 3]\nSeconda sezione."));
    }

    #[test]
    fn citation_rounds_similarity_to_four_decimals() {
        let c = citation_for(&hit("manuale.txt", 1, "testo", 0.123456));
        assert_eq!(c.similarity, 0.8765);
        assert_eq!(c.filename, "manuale.txt");
        assert_eq!(c.chunk_index, 1);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "è".repeat(300);
        let p = preview_of(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.trim_end_matches("...").chars().count(), PREVIEW_LEN);
    }

    #[test]
    fn short_text_gets_no_ellipsis() {
        assert_eq!(preview_of("breve"), "breve");
        let exact = "a".repeat(PREVIEW_LEN);
        assert_eq!(preview_of(&exact), exact);
        let over = "a".repeat(PREVIEW_LEN + 1);
        assert!(preview_of(&over).ends_with("..."));
    }
}
