//! # patent-rag
//!
//! Patent ingestion and semantic search.
//!
//! ## Overview
//!
//! Patents are split into overlapping chunks, embedded, and written to a
//! vector index together with a canonical metadata record. Queries are
//! embedded the same way, matched against the index, resolved back to whole
//! patents and ranked.
//!
//! - [`IngestionPipeline`] - chunk → embed → index → commit, with versioned
//!   replacement of older content
//! - [`SearchEngine`] - query → nearest chunks → one result per patent
//! - [`BoundaryChunker`] / [`SectionChunker`] / [`ParagraphChunker`] -
//!   deterministic text splitting
//! - [`load_patents_json`] / [`load_patents_csv`] - cleaned patents from exports
//! - [`EmbeddingProvider`], [`VectorIndex`], [`MetadataStore`] - backend seams
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | OpenAI embedding provider |
//! | `qdrant` | Qdrant vector index |
//! | `full` | Everything above |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use patent_rag::*;
//!
//! let index = Arc::new(InMemoryVectorIndex::new(384));
//! let store = Arc::new(InMemoryMetadataStore::new());
//!
//! let pipeline = IngestionPipeline::builder()
//!     .config(PatentRagConfig::default())
//!     .embedding_provider(embedder.clone())
//!     .vector_index(index.clone())
//!     .metadata_store(store.clone())
//!     .build()?;
//! pipeline.ingest(&patent, "2024-06-01").await?;
//!
//! let engine = SearchEngine::builder()
//!     .config(PatentRagConfig::default())
//!     .embedding_provider(embedder)
//!     .vector_index(index)
//!     .metadata_store(store)
//!     .build()?;
//! let results = engine.search("heat exchanger fins", 10, None).await?;
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod inmemory;
pub mod ingest;
pub mod loader;
pub mod metadata;
pub mod paragraphs;
pub mod retry;
pub mod search;
pub mod sections;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{BoundaryChunker, Chunker, MergingChunker, Span, chunk, split_spans};
pub use config::{
    ChunkingConfig, ChunkingStrategy, PatentRagConfig, PatentRagConfigBuilder, Timeouts,
};
pub use document::{
    Chunk, ChunkPayload, Embedding, IndexedChunk, IngestResult, PatentDocument, PatentMetadata,
    PatentRecord, ScoredChunk, SearchResult,
};
pub use embedding::{EmbeddingClient, EmbeddingProvider};
pub use error::{IngestStep, RagError, Result};
pub use filter::SearchFilters;
pub use inmemory::InMemoryVectorIndex;
pub use ingest::{BatchReport, IngestionPipeline, IngestionPipelineBuilder};
pub use loader::{clean_patent, load_patents_csv, load_patents_json, parse_patents_json};
pub use metadata::{InMemoryMetadataStore, MetadataStore};
pub use paragraphs::{ParagraphChunker, split_paragraphs};
pub use retry::RetryPolicy;
pub use search::{SearchEngine, SearchEngineBuilder};
pub use sections::{Section, SectionChunker, split_sections};
pub use vectorstore::{ChunkFilter, VectorIndex};

#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorIndex;
