//! Patent ingestion orchestrator.
//!
//! The [`IngestionPipeline`] loads a patent into the system exactly once per
//! version: chunk → embed → stage vectors → commit the metadata record →
//! remove chunks of older versions.
//!
//! Chunk ids embed the version tag and a revision digest of the chunk set,
//! so a new write is placed next to the live one instead of over it, even
//! when a changed document is re-ingested under the same tag. The metadata
//! record names the live revision and is written only after every new vector
//! is in the index; the search engine ignores chunks of any other revision.
//! If any step before the record write fails, the staged vectors are deleted
//! again and the previous write stays live.
//!
//! # Example
//!
//! ```rust,ignore
//! use patent_rag::{IngestionPipeline, PatentRagConfig, InMemoryVectorIndex, InMemoryMetadataStore};
//!
//! let pipeline = IngestionPipeline::builder()
//!     .config(PatentRagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_index(Arc::new(InMemoryVectorIndex::new(384)))
//!     .metadata_store(Arc::new(InMemoryMetadataStore::new()))
//!     .build()?;
//!
//! let result = pipeline.ingest(&document, "2024-06-01").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::chunking::{BoundaryChunker, Chunker, MergingChunker};
use crate::config::{ChunkingStrategy, PatentRagConfig};
use crate::document::{
    ChunkPayload, Embedding, IndexedChunk, IngestResult, PatentDocument, PatentRecord,
};
use crate::embedding::{EmbeddingClient, EmbeddingProvider};
use crate::error::{IngestStep, RagError, Result};
use crate::metadata::MetadataStore;
use crate::paragraphs::ParagraphChunker;
use crate::sections::SectionChunker;
use crate::vectorstore::{ChunkFilter, VectorIndex};

/// Per-key async mutexes. Entries nobody holds or waits on are pruned on the
/// next acquisition.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Per-document outcome of [`IngestionPipeline::ingest_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Documents that were ingested.
    pub succeeded: Vec<IngestResult>,
    /// Documents that failed, with the error for each.
    pub failed: Vec<(String, RagError)>,
}

impl BatchReport {
    /// Total chunks written across all successful documents.
    pub fn chunks_written(&self) -> usize {
        self.succeeded.iter().map(|r| r.chunks_written).sum()
    }
}

/// The ingestion orchestrator.
///
/// Construct one via [`IngestionPipeline::builder()`]. Concurrent calls for
/// different patents run in parallel; calls for the same patent id are
/// serialised, so the last writer wins without interleaving.
pub struct IngestionPipeline {
    config: PatentRagConfig,
    embedder: EmbeddingClient,
    chunker: Arc<dyn Chunker>,
    vector_index: Arc<dyn VectorIndex>,
    metadata_store: Arc<dyn MetadataStore>,
    locks: KeyedLocks,
}

fn validate_document(document: &PatentDocument, version_tag: &str) -> Result<()> {
    if document.id.trim().is_empty() {
        return Err(RagError::Validation("document id must not be empty".to_string()));
    }
    if document.full_text.trim().is_empty() {
        return Err(RagError::Validation(format!(
            "document '{}' has empty full_text",
            document.id
        )));
    }
    if document.title.trim().is_empty() {
        return Err(RagError::Validation(format!("document '{}' has an empty title", document.id)));
    }
    if version_tag.trim().is_empty() {
        return Err(RagError::Validation("version_tag must not be empty".to_string()));
    }
    Ok(())
}

impl IngestionPipeline {
    /// Create a new [`IngestionPipelineBuilder`].
    pub fn builder() -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &PatentRagConfig {
        &self.config
    }

    /// Ingest one patent under `version_tag`.
    ///
    /// Ingesting the same document and tag again leaves the stores as they
    /// were after the first call. Ingesting under a new tag, or changed text
    /// or chunking under the same tag, replaces every chunk of the previous
    /// write.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] for an empty id, title, full text or tag
    /// - [`RagError::IngestFailed`] naming the failed step and the number of
    ///   this document's new chunks still in the index
    pub async fn ingest(
        &self,
        document: &PatentDocument,
        version_tag: &str,
    ) -> Result<IngestResult> {
        validate_document(document, version_tag)?;
        let _guard = self.locks.lock(&document.id).await;
        let id = document.id.as_str();
        let fail = |step: IngestStep, chunks_committed: usize, source: RagError| {
            error!(document.id = %id, %step, chunks_committed, error = %source, "ingestion failed");
            RagError::IngestFailed {
                patent_id: id.to_string(),
                step,
                chunks_committed,
                source: Box::new(source),
            }
        };

        // 1. Chunk the full text
        let chunks =
            self.chunker.chunk(id, &document.full_text).map_err(|e| fail(IngestStep::Chunk, 0, e))?;
        let revision = crate::document::revision(version_tag, &chunks);
        debug!(document.id = %id, chunk_count = chunks.len(), %revision, "chunked document");

        // 2. Embed every chunk before touching either store
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors =
            self.embedder.embed_texts(&texts).await.map_err(|e| fail(IngestStep::Embed, 0, e))?;

        let staged: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let embedding =
                    Embedding { chunk_id: chunk.point_id(version_tag, &revision), vector };
                IndexedChunk::new(embedding, ChunkPayload::new(chunk, version_tag, &revision))
            })
            .collect();
        let staged_ids: Vec<String> = staged.iter().map(|c| c.id.clone()).collect();
        let chunk_count = staged.len();

        // 3. Look up the live write; re-ingesting it must never delete it
        let previous = self
            .config
            .retry
            .call("metadata.get", self.config.timeouts.metadata_store, || {
                self.metadata_store.get(id)
            })
            .await
            .map_err(|e| fail(IngestStep::Metadata, 0, e))?;
        let overwrites_live = previous
            .as_ref()
            .is_some_and(|record| record.version_tag == version_tag && record.revision == revision);

        // 4. Stage the new vectors
        if let Err(e) = self
            .config
            .retry
            .call("vector_index.upsert", self.config.timeouts.vector_index, || {
                self.vector_index.upsert(&staged)
            })
            .await
        {
            let committed = self.rollback(id, &staged_ids, overwrites_live).await;
            return Err(fail(IngestStep::Index, committed, e));
        }

        // 5. Commit: the record now points at the new revision
        let record = PatentRecord::from_document(document, version_tag, chunk_count)
            .with_revision(revision.as_str());
        if let Err(e) = self
            .config
            .retry
            .call("metadata.put", self.config.timeouts.metadata_store, || {
                self.metadata_store.put(record.clone())
            })
            .await
        {
            let committed = self.rollback(id, &staged_ids, overwrites_live).await;
            return Err(fail(IngestStep::Metadata, committed, e));
        }

        // 6. Drop chunks of every other write, same tag included
        let stale = ChunkFilter::source(id).excluding_revision(revision.as_str());
        let chunks_removed = self
            .config
            .retry
            .call("vector_index.delete_by_filter", self.config.timeouts.vector_index, || {
                self.vector_index.delete_by_filter(&stale)
            })
            .await
            .map_err(|e| fail(IngestStep::Cleanup, chunk_count, e))?;

        info!(
            document.id = %id,
            version = version_tag,
            %revision,
            chunks_written = chunk_count,
            chunks_removed,
            "ingested document"
        );

        Ok(IngestResult {
            patent_id: id.to_string(),
            version_tag: version_tag.to_string(),
            chunks_written: chunk_count,
            chunks_removed,
        })
    }

    /// Delete staged vectors after a failed commit, returning how many of
    /// them remain in the index.
    async fn rollback(&self, id: &str, staged_ids: &[String], overwrites_live: bool) -> usize {
        if overwrites_live {
            // Same revision as the live write: these ids are the live chunks.
            warn!(document.id = %id, "keeping chunks of the live revision after failed re-ingest");
            return staged_ids.len();
        }
        match self
            .config
            .retry
            .call("vector_index.delete", self.config.timeouts.vector_index, || {
                self.vector_index.delete(staged_ids)
            })
            .await
        {
            Ok(()) => {
                debug!(document.id = %id, count = staged_ids.len(), "rolled back staged chunks");
                0
            }
            Err(e) => {
                error!(document.id = %id, error = %e, "rollback of staged chunks failed");
                staged_ids.len()
            }
        }
    }

    /// Ingest many documents concurrently, at most `concurrency` at a time.
    ///
    /// A failing document never aborts the others. Results are reported in
    /// input order.
    pub async fn ingest_batch(
        &self,
        documents: &[PatentDocument],
        version_tag: &str,
        concurrency: usize,
    ) -> BatchReport {
        let outcomes: Vec<(String, Result<IngestResult>)> = stream::iter(documents)
            .map(|document| async move {
                (document.id.clone(), self.ingest(document, version_tag).await)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(result) => report.succeeded.push(result),
                Err(e) => report.failed.push((id, e)),
            }
        }
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            chunks_written = report.chunks_written(),
            "ingested batch"
        );
        report
    }

    /// Remove a patent: all of its chunks, then its metadata record.
    ///
    /// Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns the store error after retries are exhausted.
    pub async fn remove(&self, patent_id: &str) -> Result<usize> {
        let _guard = self.locks.lock(patent_id).await;
        let filter = ChunkFilter::source(patent_id);
        let removed = self
            .config
            .retry
            .call("vector_index.delete_by_filter", self.config.timeouts.vector_index, || {
                self.vector_index.delete_by_filter(&filter)
            })
            .await?;
        self.config
            .retry
            .call("metadata.delete", self.config.timeouts.metadata_store, || {
                self.metadata_store.delete(patent_id)
            })
            .await?;
        info!(document.id = %patent_id, chunks_removed = removed, "removed document");
        Ok(removed)
    }
}

/// Builder for constructing an [`IngestionPipeline`].
///
/// All fields except `chunker` are required. Without an explicit chunker,
/// one is built from `config.chunking`: the configured strategy, wrapped in
/// a [`MergingChunker`] when `min_chunk_chars > 0`.
#[derive(Default)]
pub struct IngestionPipelineBuilder {
    config: Option<PatentRagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl IngestionPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PatentRagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the metadata store backend.
    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    /// Override the chunker derived from the configuration.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`IngestionPipeline`].
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidConfiguration`] if a required field is missing or
    ///   the configuration is invalid
    /// - [`RagError::DimensionMismatch`] if the provider and index disagree
    pub fn build(self) -> Result<IngestionPipeline> {
        let config = self.config.ok_or_else(|| missing("config"))?;
        config.validate()?;
        let provider = self.embedding_provider.ok_or_else(|| missing("embedding_provider"))?;
        let vector_index = self.vector_index.ok_or_else(|| missing("vector_index"))?;
        let metadata_store = self.metadata_store.ok_or_else(|| missing("metadata_store"))?;

        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => {
                let chunking = &config.chunking;
                let base: Arc<dyn Chunker> = match chunking.strategy {
                    ChunkingStrategy::Fixed => Arc::new(BoundaryChunker::from_config(chunking)?),
                    ChunkingStrategy::Sections => Arc::new(SectionChunker::from_config(chunking)?),
                    ChunkingStrategy::Paragraphs => {
                        Arc::new(ParagraphChunker::from_config(chunking)?)
                    }
                };
                if chunking.min_chunk_chars > 0 {
                    Arc::new(MergingChunker::new(
                        base,
                        chunking.min_chunk_chars,
                        chunking.max_chunk_chars,
                    ))
                } else {
                    base
                }
            }
        };
        let embedder = EmbeddingClient::new(
            provider,
            vector_index.dimensions(),
            config.embed_batch_size,
            config.timeouts.embedding,
            config.retry.clone(),
        )?;

        Ok(IngestionPipeline {
            config,
            embedder,
            chunker,
            vector_index,
            metadata_store,
            locks: KeyedLocks::default(),
        })
    }
}

pub(crate) fn missing(field: &str) -> RagError {
    RagError::InvalidConfiguration(format!("{field} is required"))
}
