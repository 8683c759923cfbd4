//! Paragraph-based chunking.
//!
//! Paragraphs are runs of non-blank lines separated by one or more blank
//! lines. [`ParagraphChunker`] packs consecutive paragraphs into one chunk
//! while the packed span fits `max_chunk_chars`, and windows any paragraph
//! that is too long on its own.

use crate::chunking::{BoundaryChunker, Chunker, Span, spans_to_chunks};
use crate::config::ChunkingConfig;
use crate::document::Chunk;
use crate::error::Result;

/// Find the paragraphs of `chars`, trimmed of surrounding whitespace.
///
/// Spans are in reading order and never overlap.
pub fn split_paragraphs(chars: &[char]) -> Vec<Span> {
    let mut paragraphs = Vec::new();
    let mut current: Option<Span> = None;
    let mut line_start = 0;

    let line_ends = chars
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == '\n')
        .map(|(i, _)| i)
        .chain(std::iter::once(chars.len()));
    for line_end in line_ends {
        let line = &chars[line_start..line_end];
        match line.iter().position(|c| !c.is_whitespace()) {
            Some(first) => {
                let last = line.iter().rposition(|c| !c.is_whitespace()).unwrap_or(first);
                let end = line_start + last + 1;
                match current.as_mut() {
                    Some(paragraph) => paragraph.char_end = end,
                    None => {
                        current = Some(Span { char_start: line_start + first, char_end: end });
                    }
                }
            }
            None => paragraphs.extend(current.take()),
        }
        line_start = line_end + 1;
    }
    paragraphs.extend(current);
    paragraphs
}

/// Packs whole paragraphs into chunks.
///
/// A packed chunk runs from the start of its first paragraph to the end of
/// its last, blank lines in between included, so its text is an exact slice
/// of the source. Packed chunks do not overlap; the windows of an oversize
/// paragraph overlap as configured. Sequence indexes run contiguously.
///
/// # Example
///
/// ```rust,ignore
/// use patent_rag::{Chunker, ParagraphChunker};
///
/// let chunker = ParagraphChunker::new(800, 100)?;
/// let chunks = chunker.chunk("US10123456", &full_text)?;
/// ```
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    inner: BoundaryChunker,
}

impl ParagraphChunker {
    /// Create a new `ParagraphChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`](crate::RagError::InvalidConfiguration)
    /// if `max_chunk_chars == 0` or `overlap_chars >= max_chunk_chars`.
    pub fn new(max_chunk_chars: usize, overlap_chars: usize) -> Result<Self> {
        Ok(Self { inner: BoundaryChunker::new(max_chunk_chars, overlap_chars)? })
    }

    /// Build a chunker from a [`ChunkingConfig`].
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Ok(Self { inner: BoundaryChunker::from_config(config)? })
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, source_id: &str, text: &str) -> Result<Vec<Chunk>> {
        let chars: Vec<char> = text.chars().collect();
        let max = self.inner.max_chunk_chars();
        let mut chunks = Vec::new();
        let mut packed: Option<Span> = None;

        for paragraph in split_paragraphs(&chars) {
            if let Some(span) = packed.as_mut() {
                if paragraph.char_end - span.char_start <= max {
                    span.char_end = paragraph.char_end;
                    continue;
                }
            }
            if let Some(span) = packed.take() {
                chunks.extend(spans_to_chunks(source_id, &chars, &[span], 0, chunks.len(), None));
            }

            if paragraph.char_end - paragraph.char_start <= max {
                packed = Some(paragraph);
            } else {
                let body = &chars[paragraph.char_start..paragraph.char_end];
                let spans = self.inner.spans(body)?;
                chunks.extend(spans_to_chunks(
                    source_id,
                    body,
                    &spans,
                    paragraph.char_start,
                    chunks.len(),
                    None,
                ));
            }
        }
        if let Some(span) = packed {
            chunks.extend(spans_to_chunks(source_id, &chars, &[span], 0, chunks.len(), None));
        }
        Ok(chunks)
    }
}
