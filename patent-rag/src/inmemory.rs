//! In-memory vector index using cosine similarity.
//!
//! This module provides [`InMemoryVectorIndex`], a zero-dependency index
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{ChunkPayload, IndexedChunk, ScoredChunk};
use crate::error::{RagError, Result};
use crate::vectorstore::{ChunkFilter, VectorIndex};

/// An in-memory vector index using cosine similarity for search.
///
/// Points are stored as point id → chunk. All operations are async-safe via
/// `tokio::sync::RwLock`; an upsert batch is applied under one write lock,
/// so readers never observe half of it.
///
/// # Example
///
/// ```rust,ignore
/// use patent_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(384);
/// index.upsert(&chunks).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    dimensions: usize,
    points: RwLock<HashMap<String, IndexedChunk>>,
}

impl InMemoryVectorIndex {
    /// Create a new empty index for vectors of `dimensions` length.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, points: RwLock::new(HashMap::new()) }
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    /// Whether the index holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    /// Payloads of every stored chunk of `source_id`, in sequence order.
    pub async fn chunks_for(&self, source_id: &str) -> Vec<ChunkPayload> {
        let points = self.points.read().await;
        let mut payloads: Vec<ChunkPayload> = points
            .values()
            .filter(|p| p.payload.source_id == source_id)
            .map(|p| p.payload.clone())
            .collect();
        payloads.sort_by(|a, b| {
            a.version_tag.cmp(&b.version_tag).then(a.sequence_index.cmp(&b.sequence_index))
        });
        payloads
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != self.dimensions) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.vector.len(),
            });
        }
        let mut points = self.points.write().await;
        for chunk in chunks {
            points.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut points = self.points.write().await;
        for id in ids {
            points.remove(id);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &ChunkFilter) -> Result<usize> {
        let mut points = self.points.write().await;
        let before = points.len();
        points.retain(|_, chunk| !filter.matches(&chunk.payload));
        Ok(before - points.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        if vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        let points = self.points.read().await;

        let mut scored: Vec<ScoredChunk> = points
            .values()
            .filter(|chunk| filter.is_none_or(|f| f.matches(&chunk.payload)))
            .map(|chunk| ScoredChunk {
                id: chunk.id.clone(),
                score: cosine_similarity(&chunk.vector, vector),
                payload: chunk.payload.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
