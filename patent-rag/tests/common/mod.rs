//! Shared mocks for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use patent_rag::{
    ChunkFilter, EmbeddingProvider, InMemoryMetadataStore, InMemoryVectorIndex, IndexedChunk,
    IngestionPipeline, MetadataStore, PatentDocument, PatentRagConfig, PatentRecord, RagError,
    Result, RetryPolicy, ScoredChunk, SearchEngine, VectorIndex,
};

pub const DIM: usize = 32;

/// Deterministic bag-of-words embeddings: each lowercase word is hashed into
/// one of `dimensions` buckets, and the counts are L2-normalised.
///
/// Can be told to fail on the n-th `embed_batch` call (1-based).
pub struct BagOfWordsEmbedder {
    dimensions: usize,
    embed_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    fail_on_batch: Option<usize>,
}

impl BagOfWordsEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            embed_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            fail_on_batch: None,
        }
    }

    pub fn failing_on_batch(mut self, n: usize) -> Self {
        self.fail_on_batch = Some(n);
        self
    }

    /// Total provider calls, single and batched.
    pub fn calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst) + self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            v[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let n = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_batch == Some(n) {
            return Err(RagError::EmbeddingUnavailable {
                provider: "bag-of-words".into(),
                succeeded: 0,
                message: "service unavailable".into(),
            });
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

/// An in-memory index whose writes can be switched to fail.
///
/// With `partial_upsert` set, an upsert writes the first half of its chunks
/// and then fails.
pub struct FaultyIndex {
    pub inner: InMemoryVectorIndex,
    pub fail_upsert: AtomicBool,
    pub partial_upsert: AtomicBool,
    pub fail_delete_by_filter: AtomicBool,
}

impl FaultyIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: InMemoryVectorIndex::new(dimensions),
            fail_upsert: AtomicBool::new(false),
            partial_upsert: AtomicBool::new(false),
            fail_delete_by_filter: AtomicBool::new(false),
        }
    }

    fn unavailable() -> RagError {
        RagError::VectorIndex { backend: "faulty".into(), message: "connection reset".into() }
    }
}

#[async_trait]
impl VectorIndex for FaultyIndex {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        if self.partial_upsert.load(Ordering::SeqCst) {
            self.inner.upsert(&chunks[..chunks.len().div_ceil(2)]).await?;
            return Err(Self::unavailable());
        }
        self.inner.upsert(chunks).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.inner.delete(ids).await
    }

    async fn delete_by_filter(&self, filter: &ChunkFilter) -> Result<usize> {
        if self.fail_delete_by_filter.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.delete_by_filter(filter).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        self.inner.query(vector, top_k, filter).await
    }
}

/// An in-memory metadata store whose puts can fail and whose gets can stall.
pub struct FaultyMetadataStore {
    pub inner: InMemoryMetadataStore,
    pub fail_put: AtomicBool,
    pub stall_get: AtomicBool,
}

impl FaultyMetadataStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryMetadataStore::new(),
            fail_put: AtomicBool::new(false),
            stall_get: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MetadataStore for FaultyMetadataStore {
    async fn get(&self, patent_id: &str) -> Result<Option<PatentRecord>> {
        if self.stall_get.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.get(patent_id).await
    }

    async fn put(&self, record: PatentRecord) -> Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(RagError::MetadataStore {
                backend: "faulty".into(),
                message: "write rejected".into(),
            });
        }
        self.inner.put(record).await
    }

    async fn delete(&self, patent_id: &str) -> Result<()> {
        self.inner.delete(patent_id).await
    }
}

/// Small windows, single attempts.
pub fn test_config(embed_batch_size: usize) -> PatentRagConfig {
    PatentRagConfig::builder()
        .max_chunk_chars(100)
        .overlap_chars(20)
        .embed_batch_size(embed_batch_size)
        .retry(RetryPolicy::none())
        .build()
        .unwrap()
}

pub struct Harness {
    pub embedder: Arc<BagOfWordsEmbedder>,
    pub index: Arc<FaultyIndex>,
    pub store: Arc<FaultyMetadataStore>,
    pub pipeline: IngestionPipeline,
    pub engine: SearchEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(test_config(8), BagOfWordsEmbedder::new(DIM))
    }

    pub fn with(config: PatentRagConfig, embedder: BagOfWordsEmbedder) -> Self {
        let embedder = Arc::new(embedder);
        let index = Arc::new(FaultyIndex::new(DIM));
        let store = Arc::new(FaultyMetadataStore::new());
        let pipeline = IngestionPipeline::builder()
            .config(config.clone())
            .embedding_provider(embedder.clone())
            .vector_index(index.clone())
            .metadata_store(store.clone())
            .build()
            .unwrap();
        let engine = SearchEngine::builder()
            .config(config)
            .embedding_provider(embedder.clone())
            .vector_index(index.clone())
            .metadata_store(store.clone())
            .build()
            .unwrap();
        Self { embedder, index, store, pipeline, engine }
    }
}

pub fn patent(id: &str, title: &str, full_text: &str) -> PatentDocument {
    PatentDocument::new(id, title, full_text)
}

/// Roughly `sentences` sentences about `topic`, long enough for several chunks.
pub fn text_about(topic: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("The {topic} assembly in embodiment {i} improves the {topic} output."))
        .collect::<Vec<_>>()
        .join(" ")
}
