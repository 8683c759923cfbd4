//! Error types for the `patent-rag` crate.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The ingestion step at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStep {
    /// Splitting the full text into chunks.
    Chunk,
    /// Generating embeddings for the chunks.
    Embed,
    /// Writing chunk vectors to the vector index.
    Index,
    /// Reading or writing the canonical record in the metadata store.
    Metadata,
    /// Removing chunks left over from an earlier write.
    Cleanup,
}

impl fmt::Display for IngestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Index => "index",
            Self::Metadata => "metadata",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while ingesting or searching patents.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad caller input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad chunking or pipeline parameters. Never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The embedding provider failed (quota, timeout, malformed response).
    #[error("Embedding unavailable ({provider}) after {succeeded} item(s) succeeded: {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// How many inputs were embedded before the failure.
        succeeded: usize,
        /// A description of the failure.
        message: String,
    },

    /// The provider and the vector index disagree on vector dimensionality.
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality the vector index was created with.
        expected: usize,
        /// The dimensionality that was actually produced.
        actual: usize,
    },

    /// An external call did not complete within its deadline.
    #[error("Timeout: {operation} did not complete within {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// A vector hit referenced a patent with no metadata record.
    ///
    /// The search engine logs this and drops the hit instead of failing the query.
    #[error("Index/metadata drift: no metadata record for patent '{patent_id}'")]
    IndexMetadataDrift {
        /// The `source_id` carried by the orphaned chunk.
        patent_id: String,
    },

    /// An error occurred in the vector index backend.
    #[error("Vector index error ({backend}): {message}")]
    VectorIndex {
        /// The backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the metadata store backend.
    #[error("Metadata store error ({backend}): {message}")]
    MetadataStore {
        /// The backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Ingestion of a single document failed after retries were exhausted.
    #[error(
        "Ingestion of '{patent_id}' failed at step '{step}' ({chunks_committed} chunk(s) committed): {source}"
    )]
    IngestFailed {
        /// The document being ingested.
        patent_id: String,
        /// The step that failed.
        step: IngestStep,
        /// Chunks of this document still present in the vector index after the failure.
        chunks_committed: usize,
        /// The underlying error.
        #[source]
        source: Box<RagError>,
    },

    /// An I/O error while reading patent sources.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A CSV read error, including failure to open the file.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl RagError {
    /// Whether the calling orchestration may retry the failed operation.
    ///
    /// Network-facing failures are transient. Validation, configuration and
    /// dimension errors are deterministic and surface immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable { .. }
                | Self::Timeout { .. }
                | Self::VectorIndex { .. }
                | Self::MetadataStore { .. }
        )
    }

    /// The failed step, if this is an aggregated ingestion error.
    pub fn ingest_step(&self) -> Option<IngestStep> {
        match self {
            Self::IngestFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// A convenience result type for patent RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        let timeout = RagError::Timeout { operation: "embed".into(), after: Duration::from_secs(1) };
        assert!(timeout.is_retryable());
        assert!(
            RagError::VectorIndex { backend: "memory".into(), message: "down".into() }
                .is_retryable()
        );
        assert!(!RagError::Validation("empty query".into()).is_retryable());
        assert!(!RagError::DimensionMismatch { expected: 8, actual: 4 }.is_retryable());
    }

    #[test]
    fn ingest_failure_names_step() {
        let err = RagError::IngestFailed {
            patent_id: "US1".into(),
            step: IngestStep::Embed,
            chunks_committed: 0,
            source: Box::new(RagError::EmbeddingUnavailable {
                provider: "mock".into(),
                succeeded: 1,
                message: "quota".into(),
            }),
        };
        assert_eq!(err.ingest_step(), Some(IngestStep::Embed));
        let rendered = err.to_string();
        assert!(rendered.contains("'embed'"), "{rendered}");
        assert!(rendered.contains("0 chunk(s) committed"), "{rendered}");
    }
}
