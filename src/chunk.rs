//! Overlapping-window text chunker.
//!
//! Walks the text in windows of `size` characters. Before cutting, the
//! window end is pulled back to the nearest separator found in the second
//! half of the window, trying separators in priority order (paragraph
//! break down to "; "). The next window starts at `end − overlap`, so
//! consecutive chunks share a tail. Fragments at or below `min_len` are
//! dropped as noise, which can lose a short trailing fragment — a
//! deliberate tradeoff, documented on [`chunk_text`].
//!
//! Deterministic and side-effect free: identical inputs always produce
//! the identical chunk sequence.

use crate::config::ChunkingConfig;
use crate::models::{ChunkMetadata, DocumentRecord};

/// Separators tried when pulling a window end back, highest priority first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; "];

/// Snap a byte offset down to the nearest UTF-8 char boundary.
fn floor_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split `text` into overlapping chunks.
///
/// The caller must guarantee `overlap < size` (validated at config load).
/// Chunks shorter than or equal to `min_len` after trimming are dropped;
/// concatenating the surviving chunks with their overlaps removed covers
/// the source text apart from any dropped sub-minimum tail.
pub fn chunk_text(text: &str, size: usize, overlap: usize, min_len: usize) -> Vec<String> {
    let len = text.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        // Raw end is deliberately left unclamped: the advance below uses
        // it, which is what terminates the walk at the text's tail.
        let raw_end = start + size;
        let mut end = raw_end;

        if raw_end < len {
            // Search the second half of the window for the best separator.
            let half = floor_boundary(text, start + size / 2);
            let cut = floor_boundary(text, raw_end);
            let window = &text[half..cut];
            for sep in SEPARATORS {
                if let Some(pos) = window.rfind(sep) {
                    end = half + pos + sep.len();
                    break;
                }
            }
        }

        let slice_start = floor_boundary(text, start);
        let slice_end = floor_boundary(text, end.min(len));
        if slice_start < slice_end {
            let piece = text[slice_start..slice_end].trim();
            if piece.len() > min_len {
                chunks.push(piece.to_string());
            }
        }

        let next = end.saturating_sub(overlap);
        // Guards against stalls when a separator cut lands inside the
        // overlap span.
        start = if next > start { next } else { end };
    }

    chunks
}

/// Chunk every document, pairing each chunk with its provenance metadata.
///
/// Output order is document-then-chunk: all chunks of document 0 first,
/// in index order, then document 1, and so on. Downstream code zips
/// embeddings positionally against this sequence.
pub fn chunk_documents(
    docs: &[DocumentRecord],
    chunking: &ChunkingConfig,
) -> (Vec<String>, Vec<ChunkMetadata>) {
    let mut all_chunks = Vec::new();
    let mut all_metadata = Vec::new();

    for doc in docs {
        let chunks = chunk_text(
            &doc.text,
            chunking.size,
            chunking.overlap,
            chunking.min_chunk_len,
        );
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            all_chunks.push(chunk);
            all_metadata.push(ChunkMetadata {
                filename: doc.filename.clone(),
                source_dir: doc.source_dir.to_string_lossy().into_owned(),
                chunk_index: i,
                total_chunks: total,
                content_hash: doc.content_hash.clone(),
                doc_modified: doc.modified,
            });
        }
    }

    tracing::info!(
        chunks = all_chunks.len(),
        documents = docs.len(),
        "chunking complete"
    );
    (all_chunks, all_metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn doc(name: &str, text: &str) -> DocumentRecord {
        DocumentRecord {
            filename: name.to_string(),
            filepath: PathBuf::from(format!("/docs/{name}")),
            source_dir: PathBuf::from("/docs"),
            text: text.to_string(),
            content_hash: "0123456789ab".to_string(),
            size: text.len(),
            modified: Utc::now(),
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200, 50).is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let text = "a".repeat(300);
        let chunks = chunk_text(&text, 1000, 200, 50);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn sub_minimum_text_is_dropped() {
        let chunks = chunk_text("too short to keep", 1000, 200, 50);
        assert!(chunks.is_empty());
    }

    #[test]
    fn uniform_2100_chars_gives_three_chunks() {
        // No separators anywhere: cuts fall at the raw window boundaries.
        // Windows: [0,1000) [800,1800) [1600,2100) and the advance from
        // the unclamped end (2600 - 200 = 2400) terminates the walk.
        let text = "a".repeat(2100);
        let chunks = chunk_text(&text, 1000, 200, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn deterministic() {
        let text = "Paragrafo uno.\n\nParagrafo due, che continua. Frase lunga seguente; e poi altro testo ancora. ".repeat(30);
        let a = chunk_text(&text, 400, 80, 50);
        let b = chunk_text(&text, 400, 80, 50);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn cuts_prefer_paragraph_breaks() {
        // A paragraph break inside the second half of the first window
        // must win over later sentence separators.
        let mut text = "x".repeat(700);
        text.push_str("\n\n");
        text.push_str(&"y".repeat(600));
        let chunks = chunk_text(&text, 1000, 100, 50);
        assert_eq!(chunks[0], "x".repeat(700));
        // Next window starts 100 bytes before the cut, inside the x run.
        assert!(chunks[1].starts_with('x'));
        assert!(chunks[1].ends_with('y'));
    }

    #[test]
    fn sentence_separator_in_second_half_is_used() {
        let mut text = "z".repeat(800);
        text.push_str(". ");
        text.push_str(&"w".repeat(900));
        let chunks = chunk_text(&text, 1000, 100, 50);
        // Cut lands just after ". " at offset 802.
        assert_eq!(chunks[0].len(), 801); // trailing space trimmed
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn overlap_repeats_window_tail() {
        let text: String = (0..2100u32)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let chunks = chunk_text(&text, 1000, 200, 50);
        assert!(chunks.len() >= 2);
        let tail = &chunks[0][chunks[0].len() - 200..];
        assert!(chunks[1].starts_with(tail));
    }

    #[test]
    fn coverage_with_overlap_removed() {
        // Reconstruct by dropping each chunk's leading overlap; the result
        // must cover the original text (no separators, nothing dropped).
        let text = "k".repeat(5000);
        let (size, overlap) = (1000, 200);
        let chunks = chunk_text(&text, size, overlap, 50);
        let mut rebuilt = chunks[0].clone();
        for c in &chunks[1..] {
            rebuilt.push_str(&c[overlap.min(c.len())..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_never_splits_a_char() {
        let text = "è non è sempre così, perché la città è già blu. ".repeat(60);
        let chunks = chunk_text(&text, 500, 100, 50);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.is_char_boundary(0) && c.is_char_boundary(c.len()));
        }
    }

    #[test]
    fn chunk_documents_orders_by_document_then_chunk() {
        let docs = vec![doc("a.txt", &"a".repeat(2100)), doc("b.txt", &"b".repeat(50))];
        let cfg = ChunkingConfig::default();
        let (chunks, metadata) = chunk_documents(&docs, &cfg);
        // 3 chunks from the first document, 0 from the 50-char one.
        assert_eq!(chunks.len(), 3);
        assert_eq!(metadata.len(), 3);
        for (i, m) in metadata.iter().enumerate() {
            assert_eq!(m.filename, "a.txt");
            assert_eq!(m.chunk_index, i);
            assert_eq!(m.total_chunks, 3);
        }
    }
}
