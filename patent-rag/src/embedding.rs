//! Embedding provider trait and the batching, retrying client built on it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, local models,
/// etc.) behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it. A batch result must contain exactly
/// one vector per input, in input order.
///
/// # Example
///
/// ```rust,ignore
/// use patent_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("rotor blade cooling").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short name used in logs and errors.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Wraps an [`EmbeddingProvider`] with batching, deadlines, retries and
/// dimension checks.
///
/// Inputs are sent in batches of at most `batch_size`. Each batch is retried
/// on transient failure; once the retry budget is spent the client fails with
/// [`RagError::EmbeddingUnavailable`], reporting how many inputs had already
/// been embedded. Vectors are only returned when every input succeeded.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    batch_size: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider.name())
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EmbeddingClient {
    /// Create a client producing vectors of `dimensions` length.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the provider reports a
    /// different dimensionality, and [`RagError::InvalidConfiguration`] if
    /// `batch_size == 0`.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        dimensions: usize,
        batch_size: usize,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if provider.dimensions() != dimensions {
            return Err(RagError::DimensionMismatch {
                expected: dimensions,
                actual: provider.dimensions(),
            });
        }
        Ok(Self { provider, dimensions, batch_size, timeout, retry })
    }

    /// The vector dimensionality this client enforces.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed `texts`, returning one vector per input in input order.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingUnavailable`] once a batch exhausts its retries
    /// - [`RagError::DimensionMismatch`] if a returned vector has the wrong length
    pub async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let succeeded = vectors.len();
            debug!(
                provider = self.provider.name(),
                batch_size = batch.len(),
                succeeded,
                "embedding batch"
            );

            let batch_vectors = self
                .retry
                .call("embedding", self.timeout, || self.provider.embed_batch(batch))
                .await
                .map_err(|e| self.exhausted(e, succeeded))?;

            if batch_vectors.len() != batch.len() {
                error!(
                    provider = self.provider.name(),
                    expected = batch.len(),
                    actual = batch_vectors.len(),
                    "provider returned wrong number of vectors"
                );
                return Err(RagError::EmbeddingUnavailable {
                    provider: self.provider.name().to_string(),
                    succeeded,
                    message: format!(
                        "provider returned {} vector(s) for {} input(s)",
                        batch_vectors.len(),
                        batch.len()
                    ),
                });
            }
            for vector in &batch_vectors {
                self.check_dimensions(vector)?;
            }
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }

    /// Embed a single query string.
    ///
    /// # Errors
    ///
    /// Same as [`embed_texts`](Self::embed_texts).
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .retry
            .call("embedding", self.timeout, || self.provider.embed(text))
            .await
            .map_err(|e| self.exhausted(e, 0))?;
        self.check_dimensions(&vector)?;
        Ok(vector)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            error!(
                provider = self.provider.name(),
                expected = self.dimensions,
                actual = vector.len(),
                "embedding dimension mismatch"
            );
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Map the last error of an exhausted retry loop to `EmbeddingUnavailable`,
    /// counting inputs embedded by earlier batches.
    fn exhausted(&self, error: RagError, succeeded: usize) -> RagError {
        match error {
            RagError::EmbeddingUnavailable { provider, succeeded: in_batch, message } => {
                RagError::EmbeddingUnavailable {
                    provider,
                    succeeded: succeeded + in_batch,
                    message,
                }
            }
            other @ RagError::Timeout { .. } => RagError::EmbeddingUnavailable {
                provider: self.provider.name().to_string(),
                succeeded,
                message: other.to_string(),
            },
            other => other,
        }
    }
}
