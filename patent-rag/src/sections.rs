//! Section-aware chunking for patent full text.
//!
//! Patent full text usually carries headings such as `ABSTRACT`,
//! `BACKGROUND OF THE INVENTION`, `DETAILED DESCRIPTION` and `CLAIMS` (or
//! `What is claimed is:`) on lines of their own. [`SectionChunker`] cuts the
//! text at those headings and windows each section separately, so no chunk
//! straddles two sections and every chunk carries its section label.

use std::sync::LazyLock;

use regex::Regex;

use crate::chunking::{BoundaryChunker, Chunker, spans_to_chunks};
use crate::config::ChunkingConfig;
use crate::document::Chunk;
use crate::error::Result;

/// Label for text that precedes the first recognised heading.
pub const OTHER_SECTION: &str = "other";

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*(abstract(?: of the disclosure)?|background(?: of the invention)?|(?:technical )?field(?: of the invention)?|(?:brief )?summary(?: of the invention)?|brief description of (?:the )?drawings|detailed description(?: of (?:the )?(?:preferred )?embodiments?)?|description(?: of (?:the )?(?:preferred )?embodiments?)?|claims|what is claimed is)[ \t]*[:.]?[ \t]*\r?$",
    )
    .expect("unreachable error: failed to compile section heading pattern")
});

/// A section of patent text, in character offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Normalised section label.
    pub label: &'static str,
    /// Inclusive start offset in characters (at the heading).
    pub char_start: usize,
    /// Exclusive end offset in characters.
    pub char_end: usize,
}

fn label_for(heading: &str) -> &'static str {
    let heading = heading.to_ascii_lowercase();
    if heading.starts_with("abstract") {
        "abstract"
    } else if heading.starts_with("background")
        || heading.starts_with("field")
        || heading.starts_with("technical field")
    {
        "background"
    } else if heading.contains("summary") {
        "summary"
    } else if heading.starts_with("claims") || heading.starts_with("what is claimed") {
        "claims"
    } else {
        "description"
    }
}

/// Partition `text` into sections at recognised headings.
///
/// The sections are contiguous and cover the whole text. Text before the
/// first heading is labelled [`OTHER_SECTION`].
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut boundaries: Vec<(usize, &'static str)> = Vec::new();
    let mut chars_before = 0;
    let mut last_byte = 0;
    for caps in HEADING.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
        chars_before += text[last_byte..whole.start()].chars().count();
        last_byte = whole.start();
        boundaries.push((chars_before, label_for(name.as_str())));
    }

    let total = chars_before + text[last_byte..].chars().count();
    if total == 0 {
        return Vec::new();
    }
    if boundaries.first().is_none_or(|(start, _)| *start > 0) {
        boundaries.insert(0, (0, OTHER_SECTION));
    }

    boundaries
        .iter()
        .enumerate()
        .map(|(i, &(start, label))| Section {
            label,
            char_start: start,
            char_end: boundaries.get(i + 1).map_or(total, |(next, _)| *next),
        })
        .collect()
}

/// Chunks each patent section independently.
///
/// Sequence indexes run contiguously across sections, and offsets refer to
/// the full text. Sections containing only whitespace produce no chunks.
///
/// # Example
///
/// ```rust,ignore
/// use patent_rag::{Chunker, SectionChunker};
///
/// let chunker = SectionChunker::new(800, 100)?;
/// let chunks = chunker.chunk("US10123456", &full_text)?;
/// assert_eq!(chunks[0].section.as_deref(), Some("abstract"));
/// ```
#[derive(Debug, Clone)]
pub struct SectionChunker {
    inner: BoundaryChunker,
}

impl SectionChunker {
    /// Create a new `SectionChunker` with the given window parameters.
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

impl Chunker for SectionChunker {
    fn chunk(&self, source_id: &str, text: &str) -> Result<Vec<Chunk>> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        for section in split_sections(text) {
            let body = &chars[section.char_start..section.char_end];
            if body.iter().all(|c| c.is_whitespace()) {
                continue;
            }
            let spans = self.inner.spans(body)?;
            chunks.extend(spans_to_chunks(
                source_id,
                body,
                &spans,
                section.char_start,
                chunks.len(),
                Some(section.label),
            ));
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATENT: &str = "US 10,123,456 B2\n\
ABSTRACT\n\
A widget that spins quickly.\n\
BACKGROUND OF THE INVENTION\n\
Widgets have long been known to spin slowly.\n\
DETAILED DESCRIPTION\n\
The widget comprises a rotor and a stator.\n\
What is claimed is:\n\
1. A widget comprising a rotor.\n";

    #[test]
    fn detects_patent_headings() {
        let labels: Vec<_> = split_sections(PATENT).iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["other", "abstract", "background", "description", "claims"]);
    }

    #[test]
    fn sections_partition_the_text() {
        let sections = split_sections(PATENT);
        assert_eq!(sections[0].char_start, 0);
        assert_eq!(sections.last().unwrap().char_end, PATENT.chars().count());
        for pair in sections.windows(2) {
            assert_eq!(pair[0].char_end, pair[1].char_start);
        }
    }

    #[test]
    fn inline_mentions_are_not_headings() {
        let text = "The abstract concept of claims is discussed here.\nMore text.";
        let sections = split_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].label, OTHER_SECTION);
    }

    #[test]
    fn chunks_carry_section_labels_and_contiguous_indexes() {
        let chunker = SectionChunker::new(40, 5).unwrap();
        let chunks = chunker.chunk("US1", PATENT).unwrap();
        assert!(chunks.iter().any(|c| c.section.as_deref() == Some("claims")));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, i);
            assert!(c.char_end > c.char_start);
            assert!(c.text.chars().count() <= 40);
            let expected: String =
                PATENT.chars().skip(c.char_start).take(c.char_end - c.char_start).collect();
            assert_eq!(c.text, expected);
        }
        let claims = chunks.iter().find(|c| c.section.as_deref() == Some("claims")).unwrap();
        assert!(claims.text.starts_with("What is claimed is:"));
    }

    #[test]
    fn text_without_headings_is_one_section() {
        let chunker = SectionChunker::new(1000, 100).unwrap();
        let chunks = chunker.chunk("US1", "Plain text with no headings.").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section.as_deref(), Some(OTHER_SECTION));
    }
}
