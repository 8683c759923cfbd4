//! Vector index trait for storing chunk vectors and searching by similarity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{ChunkPayload, IndexedChunk, ScoredChunk};
use crate::error::Result;

/// Selects chunks by payload fields.
///
/// An empty filter matches every chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFilter {
    /// Only chunks of this patent.
    pub source_id: Option<String>,
    /// Skip chunks written under this version tag.
    pub exclude_version: Option<String>,
    /// Skip chunks of this write revision.
    pub exclude_revision: Option<String>,
}

impl ChunkFilter {
    /// Match every chunk of `source_id`.
    pub fn source(source_id: impl Into<String>) -> Self {
        Self { source_id: Some(source_id.into()), ..Self::default() }
    }

    /// Additionally skip chunks written under `version_tag`.
    pub fn excluding_version(mut self, version_tag: impl Into<String>) -> Self {
        self.exclude_version = Some(version_tag.into());
        self
    }

    /// Additionally skip chunks of the write `revision`.
    pub fn excluding_revision(mut self, revision: impl Into<String>) -> Self {
        self.exclude_revision = Some(revision.into());
        self
    }

    /// Whether `payload` is selected by this filter.
    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        self.source_id.as_deref().is_none_or(|id| payload.source_id == id)
            && self.exclude_version.as_deref().is_none_or(|v| payload.version_tag != v)
            && self.exclude_revision.as_deref().is_none_or(|r| payload.revision != r)
    }
}

/// A storage backend for chunk vectors with similarity search.
///
/// An index is created for a fixed vector dimensionality. Writes with a
/// different dimensionality must be rejected with
/// [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch).
///
/// # Example
///
/// ```rust,ignore
/// use patent_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(384);
/// index.upsert(&chunks).await?;
/// let hits = index.query(&query_vector, 15, None).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The dimensionality this index was created with.
    fn dimensions(&self) -> usize;

    /// Insert or overwrite chunks by id.
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()>;

    /// Delete chunks by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Delete every chunk matching `filter`, returning how many were removed.
    async fn delete_by_filter(&self, filter: &ChunkFilter) -> Result<usize>;

    /// Return up to `top_k` chunks most similar to `vector`, optionally
    /// restricted by `filter`, ordered by descending score.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ScoredChunk>>;

    /// A short name used in logs and errors.
    fn name(&self) -> &str {
        "custom"
    }
}
