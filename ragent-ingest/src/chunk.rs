//! Recursive document chunking.
//!
//! Text is cut at the coarsest separator present (blank line, newline, space,
//! then individual characters), and the pieces are merged back into chunks no
//! longer than `chunk_size` with `chunk_overlap` carried between neighbours.
//! Length is measured by a pluggable function, normally `cl100k_base` tokens.

use crate::error::{IngestError, Result};
use crate::loader::SourceDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use tracing::warn;

/// Separators tried in order, coarsest first.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Measures the length of a piece of text.
pub type LengthFn = Box<dyn Fn(&str) -> usize + Send + Sync>;

/// A piece of a source document, carrying the document's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: Map<String, Value>,
    /// Position of this chunk within its document.
    pub chunk_index: usize,
}

/// Splits text recursively by separator, measuring length with a [`LengthFn`].
pub struct RecursiveSplitter {
    separators: Vec<String>,
    chunk_size: usize,
    chunk_overlap: usize,
    length: LengthFn,
}

impl std::fmt::Debug for RecursiveSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveSplitter")
            .field("separators", &self.separators)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish_non_exhaustive()
    }
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize, length: LengthFn) -> Result<Self> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidSplitter {
                message: "chunk size must be positive".to_string(),
            });
        }
        if chunk_overlap > chunk_size {
            return Err(IngestError::InvalidSplitter {
                message: format!(
                    "chunk overlap ({chunk_overlap}) is larger than chunk size ({chunk_size})"
                ),
            });
        }
        Ok(Self {
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            chunk_size,
            chunk_overlap,
            length,
        })
    }

    /// Measure length in `cl100k_base` tokens.
    pub fn from_tiktoken(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| IngestError::Tokenizer {
            message: e.to_string(),
        })?;
        Self::new(
            chunk_size,
            chunk_overlap,
            Box::new(move |text| bpe.encode_ordinary(text).len()),
        )
    }

    /// Measure length in characters.
    pub fn by_chars(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::new(
            chunk_size,
            chunk_overlap,
            Box::new(|text| text.chars().count()),
        )
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Length of `text` as this splitter measures it.
    pub fn measure(&self, text: &str) -> usize {
        (self.length)(text)
    }

    /// Split one text into chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every document; each chunk copies its document's metadata.
    pub fn split_documents(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .enumerate()
                    .map(|(chunk_index, content)| Chunk {
                        content,
                        metadata: doc.metadata.clone(),
                        chunk_index,
                    })
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().cloned().unwrap_or_default();
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = String::new();
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.clone();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, &separator) {
            if self.measure(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge_splits(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge_splits(&fitting));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, keeping up to `chunk_overlap` of the
    /// previous chunk's tail at the start of the next.
    fn merge_splits(&self, pieces: &[String]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = self.measure(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if total > self.chunk_size {
                    warn!(
                        length = total,
                        chunk_size = self.chunk_size,
                        "Created a chunk longer than the configured size"
                    );
                }
                if let Some(chunk) = join_window(&window) {
                    merged.push(chunk);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total = total.saturating_sub(dropped),
                        None => break,
                    }
                }
            }
            window.push_back((piece.as_str(), len));
            total += len;
        }

        if let Some(chunk) = join_window(&window) {
            merged.push(chunk);
        }
        merged
    }
}

/// Split on `separator`, attaching it to the start of the following piece.
/// An empty separator splits into characters. Empty pieces are dropped.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut pieces = Vec::new();
    if let Some(first) = parts.next() {
        pieces.push(first.to_string());
    }
    pieces.extend(parts.map(|p| format!("{separator}{p}")));
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_window(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = RecursiveSplitter::by_chars(100, 10).unwrap();
        assert_eq!(splitter.split_text("  hello world \n"), vec!["hello world"]);
    }

    #[test]
    fn test_paragraph_split() {
        let splitter = RecursiveSplitter::by_chars(10, 0).unwrap();
        let chunks = splitter.split_text("aaaa\n\nbbbb\n\ncccc");
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn test_overlap_between_chunks() {
        let splitter = RecursiveSplitter::by_chars(10, 5).unwrap();
        let chunks = splitter.split_text("one two three four five");
        assert_eq!(chunks, vec!["one two", "two three", "four five"]);
    }

    #[test]
    fn test_falls_back_to_characters() {
        let splitter = RecursiveSplitter::by_chars(5, 0).unwrap();
        let chunks = splitter.split_text("abcdefghijklmnop");
        assert_eq!(chunks, vec!["abcde", "fghij", "klmno", "p"]);
    }

    #[test]
    fn test_unspaced_japanese_splits_by_character() {
        let splitter = RecursiveSplitter::by_chars(4, 0).unwrap();
        let chunks = splitter.split_text("休暇申請の手順");
        assert_eq!(chunks, vec!["休暇申請", "の手順"]);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            RecursiveSplitter::by_chars(10, 11),
            Err(IngestError::InvalidSplitter { .. })
        ));
        assert!(RecursiveSplitter::by_chars(0, 0).is_err());
    }

    #[test]
    fn test_split_documents_copies_metadata() {
        let splitter = RecursiveSplitter::by_chars(10, 0).unwrap();
        let docs = vec![
            SourceDocument::new("aaaa\n\nbbbb\n\ncccc", "docs/a.md"),
            SourceDocument::new("short", "docs/b.md"),
        ];
        let chunks = splitter.split_documents(&docs);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[1].metadata, docs[0].metadata);
        assert_eq!(chunks[2].chunk_index, 0);
        assert_eq!(chunks[2].metadata["source"], "docs/b.md");
    }

    #[test]
    fn test_token_chunks_respect_size() {
        let splitter = RecursiveSplitter::from_tiktoken(100, 20).unwrap();
        let text = "policy ".repeat(1000);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(splitter.measure(chunk) <= 100);
        }
    }

    #[test]
    fn test_token_splitter_keeps_small_document_whole() {
        let splitter = RecursiveSplitter::from_tiktoken(1000, 200).unwrap();
        let text = "# 休暇申請\n\n人事ポータルから申請します。";
        assert_eq!(splitter.split_text(text), vec![text.to_string()]);
    }
}
