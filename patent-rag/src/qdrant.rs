//! Qdrant vector index backend.
//!
//! Provides [`QdrantVectorIndex`] which implements [`VectorIndex`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Qdrant only accepts UUIDs or integers as point ids, so every chunk id is
//! mapped to a name-based UUID (v5) and the original id is kept in the
//! payload under `chunk_id`.
//!
//! # Example
//!
//! ```rust,ignore
//! use patent_rag::qdrant::QdrantVectorIndex;
//!
//! let index = QdrantVectorIndex::new("http://localhost:6334", "patents", 384)?;
//! index.ensure_collection().await?;
//! ```

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;
use uuid::Uuid;

use crate::document::{ChunkPayload, IndexedChunk, ScoredChunk};
use crate::error::{RagError, Result};
use crate::vectorstore::{ChunkFilter, VectorIndex};

const CHUNK_ID: &str = "chunk_id";

/// A [`VectorIndex`] backed by one [Qdrant](https://qdrant.tech/) collection
/// with cosine distance.
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
    dimensions: usize,
}

impl QdrantVectorIndex {
    /// Connect to the Qdrant server at `url`.
    pub fn new(url: &str, collection: impl Into<String>, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(map_err)?;
        Ok(Self::from_client(client, collection, dimensions))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Qdrant, collection: impl Into<String>, dimensions: usize) -> Self {
        Self { client, collection: collection.into(), dimensions }
    }

    /// Name of the backing collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection if it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<()> {
        let collections = self.client.list_collections().await.map_err(map_err)?;
        if collections.collections.iter().any(|c| c.name == self.collection) {
            debug!(collection = %self.collection, "qdrant collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(map_err)?;

        debug!(collection = %self.collection, dimensions = self.dimensions, "created qdrant collection");
        Ok(())
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.dimensions {
            return Err(RagError::DimensionMismatch { expected: self.dimensions, actual });
        }
        Ok(())
    }
}

fn map_err(e: qdrant_client::QdrantError) -> RagError {
    RagError::VectorIndex { backend: "qdrant".to_string(), message: e.to_string() }
}

fn qdrant_point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

fn to_filter(filter: &ChunkFilter) -> Filter {
    let mut qdrant_filter = Filter::default();
    if let Some(source_id) = &filter.source_id {
        qdrant_filter.must.push(Condition::matches("source_id", source_id.clone()));
    }
    if let Some(version) = &filter.exclude_version {
        qdrant_filter.must_not.push(Condition::matches("version_tag", version.clone()));
    }
    if let Some(revision) = &filter.exclude_revision {
        qdrant_filter.must_not.push(Condition::matches("revision", revision.clone()));
    }
    qdrant_filter
}

fn to_payload(chunk: &IndexedChunk) -> Result<Payload> {
    let mut json = serde_json::to_value(&chunk.payload)?;
    if let Some(map) = json.as_object_mut() {
        map.insert(CHUNK_ID.to_string(), serde_json::Value::String(chunk.id.clone()));
    }
    Payload::try_from(json).map_err(map_err)
}

fn string_field(payload: &std::collections::HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn usize_field(payload: &std::collections::HashMap<String, QdrantValue>, key: &str) -> Option<usize> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok(),
        Some(Kind::DoubleValue(n)) if *n >= 0.0 => Some(*n as usize),
        _ => None,
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .map(|chunk| {
                self.check_dimensions(chunk.vector.len())?;
                Ok(PointStruct::new(
                    qdrant_point_id(&chunk.id),
                    chunk.vector.clone(),
                    to_payload(chunk)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(map_err)?;

        debug!(collection = %self.collection, count = chunks.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<qdrant_client::qdrant::PointId> =
            ids.iter().map(|id| qdrant_point_id(id).into()).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(map_err)?;

        debug!(collection = %self.collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &ChunkFilter) -> Result<usize> {
        let qdrant_filter = to_filter(filter);
        let count = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection).filter(qdrant_filter.clone()).exact(true),
            )
            .await
            .map_err(map_err)?
            .result
            .map_or(0, |r| r.count as usize);
        if count == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(qdrant_filter).wait(true))
            .await
            .map_err(map_err)?;

        debug!(collection = %self.collection, count, "deleted points by filter from qdrant");
        Ok(count)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        self.check_dimensions(vector.len())?;

        let mut request = SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
            .with_payload(true);
        if let Some(filter) = filter {
            request = request.filter(to_filter(filter));
        }
        let response = self.client.search_points(request).await.map_err(map_err)?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|scored| {
                let payload = &scored.payload;
                Some(ScoredChunk {
                    id: string_field(payload, CHUNK_ID)?,
                    score: scored.score,
                    payload: ChunkPayload {
                        source_id: string_field(payload, "source_id")?,
                        version_tag: string_field(payload, "version_tag")?,
                        revision: string_field(payload, "revision").unwrap_or_default(),
                        sequence_index: usize_field(payload, "sequence_index")?,
                        text: string_field(payload, "text").unwrap_or_default(),
                        char_start: usize_field(payload, "char_start").unwrap_or_default(),
                        char_end: usize_field(payload, "char_end").unwrap_or_default(),
                        section: string_field(payload, "section"),
                    },
                })
            })
            .collect();

        Ok(hits)
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_uuids() {
        let a = qdrant_point_id("US1#v1#3f2a#0");
        assert_eq!(a, qdrant_point_id("US1#v1#3f2a#0"));
        assert_ne!(a, qdrant_point_id("US1#v1#9b7c#0"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn filter_maps_to_must_and_must_not() {
        let filter = to_filter(&ChunkFilter::source("US1").excluding_version("v2"));
        assert_eq!(filter.must.len(), 1);
        assert_eq!(filter.must_not.len(), 1);

        let stale = to_filter(&ChunkFilter::source("US1").excluding_revision("3f2a"));
        assert_eq!(stale.must.len(), 1);
        assert_eq!(stale.must_not.len(), 1);

        let empty = to_filter(&ChunkFilter::default());
        assert!(empty.must.is_empty() && empty.must_not.is_empty());
    }
}
