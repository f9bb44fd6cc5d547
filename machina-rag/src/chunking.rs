//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`] - splits by character count with exact overlap
//! - [`RecursiveChunker`] - splits hierarchically by paragraphs, lines, sentences, then words
//!
//! Sizes are counted in `char`s, so multi-byte text is never cut inside a code point.

use std::collections::VecDeque;

use crate::config::{ChunkingStrategy, RagConfig};
use crate::document::{CHUNK_INDEX_KEY, Chunk, Document};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, in order.
    ///
    /// Returns an empty `Vec` if the document has empty text. No chunk is
    /// longer than the chunker's configured size.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Build the chunker selected by `config`.
pub fn chunker_for(config: &RagConfig) -> Box<dyn Chunker> {
    match config.chunking {
        ChunkingStrategy::Fixed => {
            Box::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap))
        }
        ChunkingStrategy::Recursive => {
            Box::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        }
    }
}

/// Split every document, keeping document order and then position order.
pub fn split_documents(documents: &[Document], chunker: &dyn Chunker) -> Vec<Chunk> {
    documents.iter().flat_map(|doc| chunker.chunk(doc)).collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunks(document: &Document, texts: Vec<String>) -> Vec<Chunk> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut metadata = document.metadata.clone();
            metadata.insert(CHUNK_INDEX_KEY.to_string(), i.to_string());
            Chunk {
                id: format!("{}_{i}", document.id),
                text,
                metadata,
                document_id: document.id.clone(),
            }
        })
        .collect()
}

/// Character windows of `chunk_size` advancing by `chunk_size - chunk_overlap`.
///
/// Stops at the first window that reaches the end of the text, so the tail is
/// never emitted as a chunk already contained in its predecessor.
fn fixed_windows(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let offsets: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let n = offsets.len() - 1;
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(n);
        windows.push(text[offsets[start]..offsets[end]].to_string());
        if end == n {
            break;
        }
        start += step;
    }
    windows
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Consecutive chunks share exactly `chunk_overlap` characters. Chunk IDs are
/// generated as `{document_id}_{chunk_index}`.
///
/// # Example
///
/// ```rust,ignore
/// use machina_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        make_chunks(document, fixed_windows(&document.text, self.chunk_size, self.chunk_overlap))
    }
}

/// Splits text hierarchically: paragraphs → lines → sentences → words → characters.
///
/// Text is cut at the coarsest separator it contains. Pieces that fit are
/// merged greedily up to `chunk_size`; each new chunk starts with trailing
/// pieces of the previous one totalling at most `chunk_overlap` characters.
/// Pieces that are still too long are split with the next separator.
///
/// # Example
///
/// ```rust,ignore
/// use machina_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - maximum number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some(pos) = separators.iter().position(|s| text.contains(s)) else {
            return fixed_windows(text, self.chunk_size, self.chunk_overlap)
                .into_iter()
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
        };
        let remaining = &separators[pos + 1..];

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separators[pos]) {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting));
                fitting.clear();
            }
            out.extend(self.split_text(piece, remaining));
        }
        if !fitting.is_empty() {
            out.extend(self.merge(&fitting));
        }
        out
    }

    /// Greedily join pieces (each no longer than `chunk_size`) into chunks.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }
        make_chunks(document, self.split_text(&document.text, &SEPARATORS))
    }
}
