//! Document chunking.
//!
//! This module provides the [`Chunker`] trait, the [`split_spans`] windowing
//! function and [`BoundaryChunker`], which applies it to a whole document.
//! [`SectionChunker`](crate::sections::SectionChunker) applies the same
//! windowing per patent section and
//! [`ParagraphChunker`](crate::paragraphs::ParagraphChunker) packs whole
//! paragraphs. [`MergingChunker`] folds undersized chunks of any of them into
//! a neighbour.
//!
//! Windows start every `max_chunk_chars - overlap_chars` characters. Each
//! window ends at the nearest sentence boundary, else the nearest word
//! boundary, within a small lookback from its maximum end, and falls back to a
//! hard cut. The end never moves back past the next window's start, so the
//! spans always cover the whole text, consecutive spans share at most
//! `overlap_chars` characters, and no span is empty.

use std::sync::Arc;

use crate::config::{ChunkingConfig, validate_chunk_params};
use crate::document::Chunk;
use crate::error::Result;

/// Default number of characters searched for a boundary before a hard cut.
pub const DEFAULT_BOUNDARY_LOOKBACK: usize = 64;

/// A strategy for splitting a document's text into chunks.
///
/// Implementations are pure: the same input always yields the same chunks.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunks attributed to `source_id`.
    ///
    /// Returns an empty `Vec` for empty text.
    fn chunk(&self, source_id: &str, text: &str) -> Result<Vec<Chunk>>;
}

/// A half-open character range `[char_start, char_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Inclusive start offset in characters.
    pub char_start: usize,
    /// Exclusive end offset in characters.
    pub char_end: usize,
}

/// Compute chunk spans over `chars`.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfiguration`](crate::RagError::InvalidConfiguration)
/// if `max_chunk_chars == 0` or `overlap_chars >= max_chunk_chars`.
pub fn split_spans(
    chars: &[char],
    max_chunk_chars: usize,
    overlap_chars: usize,
    lookback: usize,
) -> Result<Vec<Span>> {
    validate_chunk_params(max_chunk_chars, overlap_chars)?;

    let len = chars.len();
    let step = max_chunk_chars - overlap_chars;
    let mut spans = Vec::new();
    let mut start = 0;

    while start < len {
        let hard_end = start + max_chunk_chars;
        if hard_end >= len {
            spans.push(Span { char_start: start, char_end: len });
            break;
        }

        // A cut must land after the next window's start so nothing is skipped.
        let earliest = (start + step + 1).max(hard_end.saturating_sub(lookback));
        let end = find_break(chars, earliest, hard_end).unwrap_or(hard_end);
        spans.push(Span { char_start: start, char_end: end });
        start += step;
    }

    Ok(spans)
}

/// Search `[earliest, latest]` backwards for a cut position, sentence ends first.
fn find_break(chars: &[char], earliest: usize, latest: usize) -> Option<usize> {
    if earliest > latest {
        return None;
    }
    (earliest..=latest)
        .rev()
        .find(|&cut| is_sentence_break(chars, cut))
        .or_else(|| (earliest..=latest).rev().find(|&cut| is_word_break(chars, cut)))
}

/// A cut after a newline, or after terminal punctuation followed by whitespace.
fn is_sentence_break(chars: &[char], cut: usize) -> bool {
    match chars[..cut].last() {
        Some('\n') => true,
        Some('.' | '!' | '?') => chars.get(cut).is_none_or(|c| c.is_whitespace()),
        _ => false,
    }
}

/// A cut that does not split a word.
fn is_word_break(chars: &[char], cut: usize) -> bool {
    chars[..cut].last().is_some_and(|c| c.is_whitespace())
        || chars.get(cut).is_some_and(|c| c.is_whitespace())
}

/// Chunk `text` with the default boundary lookback.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfiguration`](crate::RagError::InvalidConfiguration)
/// before producing any chunk if the parameters are inconsistent.
pub fn chunk(
    source_id: &str,
    text: &str,
    max_chunk_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<Chunk>> {
    BoundaryChunker::new(max_chunk_chars, overlap_chars)?.chunk(source_id, text)
}

/// Build [`Chunk`]s for `spans` of `chars`, shifting offsets by `offset` and
/// numbering from `first_index`.
pub(crate) fn spans_to_chunks(
    source_id: &str,
    chars: &[char],
    spans: &[Span],
    offset: usize,
    first_index: usize,
    section: Option<&str>,
) -> Vec<Chunk> {
    spans
        .iter()
        .enumerate()
        .map(|(i, span)| Chunk {
            source_id: source_id.to_string(),
            sequence_index: first_index + i,
            text: chars[span.char_start..span.char_end].iter().collect(),
            char_start: offset + span.char_start,
            char_end: offset + span.char_end,
            section: section.map(str::to_string),
        })
        .collect()
}

/// Splits a whole document into overlapping, boundary-aligned windows.
///
/// # Example
///
/// ```rust,ignore
/// use patent_rag::{BoundaryChunker, Chunker};
///
/// let chunker = BoundaryChunker::new(1000, 100)?;
/// let chunks = chunker.chunk("US10123456", &full_text)?;
/// ```
#[derive(Debug, Clone)]
pub struct BoundaryChunker {
    max_chunk_chars: usize,
    overlap_chars: usize,
    lookback: usize,
}

impl BoundaryChunker {
    /// Create a new `BoundaryChunker`.
    ///
    /// # Arguments
    ///
    /// * `max_chunk_chars` - maximum number of characters per chunk
    /// * `overlap_chars` - number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`](crate::RagError::InvalidConfiguration)
    /// if `max_chunk_chars == 0` or `overlap_chars >= max_chunk_chars`.
    pub fn new(max_chunk_chars: usize, overlap_chars: usize) -> Result<Self> {
        validate_chunk_params(max_chunk_chars, overlap_chars)?;
        Ok(Self { max_chunk_chars, overlap_chars, lookback: DEFAULT_BOUNDARY_LOOKBACK })
    }

    /// Build a chunker from a [`ChunkingConfig`].
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Ok(Self::new(config.max_chunk_chars, config.overlap_chars)?
            .with_lookback(config.boundary_lookback))
    }

    /// Set how many characters to search for a boundary before cutting hard.
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub(crate) fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    pub(crate) fn spans(&self, chars: &[char]) -> Result<Vec<Span>> {
        split_spans(chars, self.max_chunk_chars, self.overlap_chars, self.lookback)
    }
}

impl Chunker for BoundaryChunker {
    fn chunk(&self, source_id: &str, text: &str) -> Result<Vec<Chunk>> {
        let chars: Vec<char> = text.chars().collect();
        let spans = self.spans(&chars)?;
        Ok(spans_to_chunks(source_id, &chars, &spans, 0, 0, None))
    }
}

/// Wraps another chunker and merges chunks shorter than `min_chunk_chars`.
///
/// An undersized chunk absorbs the following chunks of the same section
/// while the merged span stays within `max_chunk_chars`; failing that, it
/// is appended to the previous chunk under the same condition. A chunk that
/// fits neither way is kept as is, so the text stays fully covered. Merged
/// text is re-read from the source, offsets stay exact and sequence indexes
/// are renumbered from 0.
pub struct MergingChunker {
    inner: Arc<dyn Chunker>,
    min_chunk_chars: usize,
    max_chunk_chars: usize,
}

impl MergingChunker {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn Chunker>, min_chunk_chars: usize, max_chunk_chars: usize) -> Self {
        Self { inner, min_chunk_chars, max_chunk_chars }
    }
}

impl Chunker for MergingChunker {
    fn chunk(&self, source_id: &str, text: &str) -> Result<Vec<Chunk>> {
        let chunks = self.inner.chunk(source_id, text)?;
        let chars: Vec<char> = text.chars().collect();
        Ok(merge_small_chunks(&chars, chunks, self.min_chunk_chars, self.max_chunk_chars))
    }
}

fn span_len(chunk: &Chunk) -> usize {
    chunk.char_end - chunk.char_start
}

fn extend_to(chunk: &mut Chunk, chars: &[char], char_end: usize) {
    chunk.char_end = chunk.char_end.max(char_end);
    chunk.text = chars[chunk.char_start..chunk.char_end].iter().collect();
}

pub(crate) fn merge_small_chunks(
    chars: &[char],
    chunks: Vec<Chunk>,
    min_chunk_chars: usize,
    max_chunk_chars: usize,
) -> Vec<Chunk> {
    let fits = |first: &Chunk, last: &Chunk| {
        first.section == last.section
            && last.char_end.saturating_sub(first.char_start) <= max_chunk_chars
    };

    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    let mut rest = chunks.into_iter().peekable();
    while let Some(mut current) = rest.next() {
        while span_len(&current) < min_chunk_chars {
            let Some(next) = rest.next_if(|next| fits(&current, next)) else { break };
            extend_to(&mut current, chars, next.char_end);
        }
        if span_len(&current) < min_chunk_chars {
            if let Some(previous) = merged.last_mut().filter(|previous| fits(previous, &current)) {
                extend_to(previous, chars, current.char_end);
                continue;
            }
        }
        current.sequence_index = merged.len();
        merged.push(current);
    }
    merged
}
