//! Data types for patents, chunks, index records and search results.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// Structured patent fields.
///
/// The well-known bibliographic fields are typed. Any other scalar field
/// supplied by an ingestion source is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatentMetadata {
    /// Named inventors, in source order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inventors: Vec<String>,
    /// The assignee (owner) of the patent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Publication date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,
    /// Publication number including kind code, e.g. `US10123456B2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patent_number: Option<String>,
    /// CPC/IPC classification codes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classification_codes: Vec<String>,
    /// Source-specific fields with no dedicated slot.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// A patent as delivered by an ingestion source. Never mutated; a newer
/// revision is ingested under a new version tag instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatentDocument {
    /// Unique patent identifier.
    pub id: String,
    /// Title of the invention.
    pub title: String,
    /// Abstract text.
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    /// Full text that gets chunked and embedded.
    pub full_text: String,
    /// Structured fields.
    #[serde(default)]
    pub metadata: PatentMetadata,
}

impl PatentDocument {
    /// Create a document with empty abstract and metadata.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        full_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: String::new(),
            full_text: full_text.into(),
            metadata: PatentMetadata::default(),
        }
    }

    /// Set the abstract.
    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = abstract_text.into();
        self
    }

    /// Set the structured metadata.
    pub fn with_metadata(mut self, metadata: PatentMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A bounded span of a document's text; the unit that gets embedded.
///
/// Offsets count characters (Unicode scalar values), not bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The [`PatentDocument::id`] this chunk was cut from.
    pub source_id: String,
    /// Position of this chunk in reading order, starting at 0.
    pub sequence_index: usize,
    /// The chunk text.
    pub text: String,
    /// Inclusive start offset into the source text.
    pub char_start: usize,
    /// Exclusive end offset into the source text.
    pub char_end: usize,
    /// Patent section the chunk belongs to, when chunked by section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Chunk {
    /// Identifier of this chunk in the vector index for the given write.
    pub fn point_id(&self, version_tag: &str, revision: &str) -> String {
        point_id(&self.source_id, version_tag, revision, self.sequence_index)
    }
}

/// Build the vector index id `{source_id}#{version_tag}#{revision}#{sequence_index}`.
pub fn point_id(
    source_id: &str,
    version_tag: &str,
    revision: &str,
    sequence_index: usize,
) -> String {
    format!("{source_id}#{version_tag}#{revision}#{sequence_index}")
}

/// Hex characters kept from the revision digest.
const REVISION_LEN: usize = 16;

/// Digest of a version tag and the exact chunk set written under it.
///
/// Two ingestions share a revision only when they write the same chunks
/// under the same tag, so their point ids coincide only when their content
/// does.
pub fn revision(version_tag: &str, chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(version_tag.as_bytes());
    for chunk in chunks {
        hasher.update([0u8]);
        hasher.update(chunk.sequence_index.to_le_bytes());
        hasher.update(chunk.char_start.to_le_bytes());
        hasher.update(chunk.char_end.to_le_bytes());
        hasher.update(chunk.section.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.text.as_bytes());
    }
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(REVISION_LEN);
    digest
}

/// A vector produced for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The vector index id of the chunk this vector represents.
    pub chunk_id: String,
    /// The embedding vector.
    pub vector: Vec<f32>,
}

/// Chunk fields stored alongside each vector in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkPayload {
    /// The patent this chunk belongs to.
    pub source_id: String,
    /// The ingestion version that wrote this chunk.
    pub version_tag: String,
    /// Revision of the write that produced this chunk; see [`revision`].
    #[serde(default)]
    pub revision: String,
    /// Position in reading order.
    pub sequence_index: usize,
    /// The chunk text.
    pub text: String,
    /// Inclusive start offset into the source text.
    pub char_start: usize,
    /// Exclusive end offset into the source text.
    pub char_end: usize,
    /// Patent section label, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl ChunkPayload {
    /// Build the payload for `chunk` written under `version_tag` and `revision`.
    pub fn new(chunk: Chunk, version_tag: &str, revision: &str) -> Self {
        Self {
            source_id: chunk.source_id,
            version_tag: version_tag.to_string(),
            revision: revision.to_string(),
            sequence_index: chunk.sequence_index,
            text: chunk.text,
            char_start: chunk.char_start,
            char_end: chunk.char_end,
            section: chunk.section,
        }
    }
}

/// A vector and its payload, as written to the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    /// Unique point id; see [`point_id`].
    pub id: String,
    /// The embedding vector.
    pub vector: Vec<f32>,
    /// Chunk fields.
    pub payload: ChunkPayload,
}

impl IndexedChunk {
    /// Pair an embedding with the payload of the chunk it was computed from.
    pub fn new(embedding: Embedding, payload: ChunkPayload) -> Self {
        Self { id: embedding.chunk_id, vector: embedding.vector, payload }
    }
}

/// A vector index hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// The point id.
    pub id: String,
    /// Similarity to the query vector (cosine, higher is closer).
    pub score: f32,
    /// Chunk fields.
    pub payload: ChunkPayload,
}

/// The canonical metadata record for a patent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatentRecord {
    /// Unique patent identifier.
    pub id: String,
    /// Title of the invention.
    pub title: String,
    /// Abstract text.
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    /// Structured fields.
    #[serde(default)]
    pub metadata: PatentMetadata,
    /// Version tag of the ingestion that produced the live chunks.
    pub version_tag: String,
    /// Revision of the live chunks; search ignores chunks of any other.
    #[serde(default)]
    pub revision: String,
    /// Number of chunks written for that version.
    pub chunk_count: usize,
    /// When the record was written.
    pub ingested_at: DateTime<Utc>,
}

impl PatentRecord {
    /// Build the record for `document` ingested under `version_tag`.
    pub fn from_document(document: &PatentDocument, version_tag: &str, chunk_count: usize) -> Self {
        Self {
            id: document.id.clone(),
            title: document.title.clone(),
            abstract_text: document.abstract_text.clone(),
            metadata: document.metadata.clone(),
            version_tag: version_tag.to_string(),
            revision: String::new(),
            chunk_count,
            ingested_at: Utc::now(),
        }
    }

    /// Set the revision of the live chunks.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Whether `payload` belongs to the live chunk set this record names.
    pub fn is_live(&self, payload: &ChunkPayload) -> bool {
        payload.version_tag == self.version_tag
            && payload.revision == self.revision
            && payload.sequence_index < self.chunk_count
    }

    /// Check the fields a store must never accept empty.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] if `id`, `title` or `version_tag` is blank.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RagError::Validation("patent record id must not be empty".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(RagError::Validation(format!(
                "patent record '{}' has an empty title",
                self.id
            )));
        }
        if self.version_tag.trim().is_empty() {
            return Err(RagError::Validation(format!(
                "patent record '{}' has an empty version tag",
                self.id
            )));
        }
        Ok(())
    }
}

/// One search hit, resolved to its patent record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The patent id.
    pub patent_id: String,
    /// Cosine similarity of the best matching chunk, in `[-1, 1]`.
    pub score: f32,
    /// Text of the best matching chunk.
    pub matched_chunk_text: String,
    /// Section of the best matching chunk, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_section: Option<String>,
    /// Title of the invention.
    pub title: String,
    /// Abstract text.
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Structured fields.
    pub metadata: PatentMetadata,
}

impl SearchResult {
    /// Combine a vector hit with the record it resolved to.
    pub fn new(hit: ScoredChunk, record: &PatentRecord) -> Self {
        Self {
            patent_id: record.id.clone(),
            score: hit.score,
            matched_chunk_text: hit.payload.text,
            matched_section: hit.payload.section,
            title: record.title.clone(),
            abstract_text: record.abstract_text.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResult {
    /// The ingested patent.
    pub patent_id: String,
    /// The version tag the chunks were written under.
    pub version_tag: String,
    /// Chunks written to the vector index.
    pub chunks_written: usize,
    /// Chunks of earlier writes removed from the vector index.
    pub chunks_removed: usize,
}
