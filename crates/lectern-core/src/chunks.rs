//! Splits loaded documents into overlapping chunks for embedding and retrieval.
//!
//! Text is split recursively: on paragraph breaks first, then line breaks, then
//! sentence endings, then spaces, then single characters. Small pieces are merged
//! back together up to `chunk_size` characters, and consecutive chunks share up to
//! `chunk_overlap` characters so context is not lost at the boundaries.
//!
//! `chunk_size` is a soft target: a piece that cannot be split by any of the
//! configured separators is kept whole, even if it is longer.

use std::collections::VecDeque;

use crate::config::Config;
use crate::documents::{Document, Metadata};

/// Default maximum characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default characters shared by consecutive chunks of the same document.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Separators in order of preference. The empty separator splits between characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " ", ""];

/// A chunk of text from a document, with the document's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&Config> for ChunkConfig {
    fn from(config: &Config) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

/// Chunk every document, keeping document order. Each chunk carries its document's metadata.
pub fn chunk_documents(documents: &[Document], config: &ChunkConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            split_text(&doc.text, config)
                .into_iter()
                .map(|text| Chunk {
                    text,
                    metadata: doc.metadata.clone(),
                })
        })
        .collect()
}

/// Split one text into trimmed, non-empty chunks.
pub fn split_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let size = config.chunk_size.max(1);
    // Overlap must leave room for new text in every chunk.
    let overlap = config.chunk_overlap.min(size - 1);
    let separators: Vec<&str> = config.separators.iter().map(String::as_str).collect();
    split_recursive(text, &separators, size, overlap)
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let Some(level) = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
    else {
        // Nothing left to split on: keep the piece whole.
        return vec![text.to_string()];
    };
    let separator = separators[level];
    let finer = &separators[level + 1..];

    let mut chunks = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();
    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) <= size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            chunks.extend(merge_pieces(&fitting, size, overlap));
            fitting.clear();
        }
        chunks.extend(split_recursive(piece, finer, size, overlap));
    }
    if !fitting.is_empty() {
        chunks.extend(merge_pieces(&fitting, size, overlap));
    }
    chunks
}

/// Splits after each occurrence of `separator`, so concatenating the pieces gives `text` back.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    text.split_inclusive(separator).collect()
}

/// Greedily packs adjacent pieces into chunks of at most `size` characters. When a chunk
/// is emitted, its trailing pieces (up to `overlap` characters) start the next one.
fn merge_pieces(pieces: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0;
    for &piece in pieces {
        let len = char_len(piece);
        if total + len > size && !window.is_empty() {
            push_joined(&mut chunks, &window);
            while total > overlap || (total > 0 && total + len > size) {
                let Some(front) = window.pop_front() else {
                    break;
                };
                total -= char_len(front);
            }
        }
        window.push_back(piece);
        total += len;
    }
    push_joined(&mut chunks, &window);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str, page: Option<u32>) -> Document {
        Document {
            text: text.to_string(),
            metadata: Metadata {
                source: "materials/bio101.txt".into(),
                page,
            },
        }
    }

    /// Checks that the chunks appear in order in `text` and that only whitespace
    /// falls between (or around) them.
    fn assert_covers(text: &str, chunks: &[String]) {
        let mut prev_start = 0;
        let mut covered_to = 0;
        for chunk in chunks {
            let start = text[prev_start..]
                .find(chunk.as_str())
                .map(|p| p + prev_start)
                .unwrap_or_else(|| panic!("chunk not found in order: {chunk:?}"));
            if start > covered_to {
                assert!(
                    text[covered_to..start].trim().is_empty(),
                    "text dropped between chunks: {:?}",
                    &text[covered_to..start]
                );
            }
            covered_to = covered_to.max(start + chunk.len());
            prev_start = start;
        }
        assert!(text[covered_to..].trim().is_empty());
    }

    #[test]
    fn empty_text_gives_no_chunks() {
        assert!(split_text("", &ChunkConfig::default()).is_empty());
        assert!(split_text(" \n\n \n", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let c = split_text("Mitochondria make ATP.", &ChunkConfig::default());
        assert_eq!(c, vec!["Mitochondria make ATP.".to_string()]);
    }

    #[test]
    fn paragraphs_merge_up_to_size() {
        let config = ChunkConfig::new(25, 0);
        let c = split_text("Para one.\n\nPara two.\n\nA third paragraph.", &config);
        assert_eq!(c, vec!["Para one.\n\nPara two.", "A third paragraph."]);
    }

    #[test]
    fn flat_text_of_2500_chars_gives_three_chunks() {
        let text: String = (0..250).map(|i| format!("term{i:05} ")).collect();
        assert_eq!(text.chars().count(), 2500);
        let c = split_text(&text, &ChunkConfig::new(1000, 200));
        assert_eq!(c.len(), 3);
        assert!(c.iter().all(|ch| ch.chars().count() <= 1000));
        assert_covers(&text, &c);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text: String = (0..60).map(|i| format!("Fact number {i} is true. ")).collect();
        let c = split_text(&text, &ChunkConfig::new(200, 60));
        assert!(c.len() > 2);
        for pair in c.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let shared = (1..=prev.len()).any(|k| next.starts_with(&prev[prev.len() - k..]));
            assert!(shared, "no overlap between {prev:?} and {next:?}");
        }
        assert_covers(&text, &c);
    }

    #[test]
    fn chunks_respect_size_and_cover_mixed_text() {
        let mut text = String::new();
        for p in 0..12 {
            for s in 0..7 {
                text.push_str(&format!("Paragraph {p} sentence {s} talks about enzymes. "));
            }
            text.push_str(if p % 3 == 0 { "\n" } else { "\n\n" });
        }
        let config = ChunkConfig::new(300, 50);
        let c = split_text(&text, &config);
        assert!(c.iter().all(|ch| ch.chars().count() <= 300));
        assert_covers(&text, &c);
    }

    #[test]
    fn unsplittable_unit_is_kept_whole() {
        // Without the character-level fallback, a long sentence has nowhere to split.
        let config = ChunkConfig::new(20, 0).with_separators(["\n\n", ". "]);
        let c = split_text(
            "Short one. A single sentence that is far longer than twenty characters. End.",
            &config,
        );
        assert_eq!(
            c,
            vec![
                "Short one.",
                "A single sentence that is far longer than twenty characters.",
                "End.",
            ]
        );
        assert!(c[1].chars().count() > 20);
    }

    #[test]
    fn long_word_falls_back_to_characters() {
        let word = "x".repeat(45);
        let c = split_text(&word, &ChunkConfig::new(20, 5));
        assert!(c.iter().all(|ch| ch.chars().count() <= 20));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let text = "é".repeat(30);
        let c = split_text(&text, &ChunkConfig::new(10, 0));
        assert_eq!(c.len(), 3);
        assert!(c.iter().all(|ch| ch.chars().count() == 10));
    }

    #[test]
    fn chunks_keep_document_metadata() {
        let docs = vec![doc("Page one text.", Some(1)), doc("Page two text.", Some(2))];
        let c = chunk_documents(&docs, &ChunkConfig::default());
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].metadata.page, Some(1));
        assert_eq!(c[1].metadata.page, Some(2));
        assert_eq!(c[1].text, "Page two text.");
    }
}
