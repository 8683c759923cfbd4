//! Configuration for ingestion and search.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// How full text is split into chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Fixed-stride windows over the whole text, breaking at sentence or word boundaries.
    #[default]
    Fixed,
    /// The same windows, applied within each detected patent section.
    Sections,
    /// Blank-line separated paragraphs packed up to the size limit; oversize
    /// paragraphs are windowed on their own.
    Paragraphs,
}

/// Chunk sizing parameters. All sizes are in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length.
    pub max_chunk_chars: usize,
    /// Characters shared by consecutive chunks.
    pub overlap_chars: usize,
    /// How far back from a window's end to look for a sentence or word boundary.
    pub boundary_lookback: usize,
    /// How the text is split before windowing.
    pub strategy: ChunkingStrategy,
    /// Chunks shorter than this are merged into a neighbour of the same
    /// section when the merged span fits `max_chunk_chars`. `0` disables merging.
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 1000,
            overlap_chars: 200,
            boundary_lookback: 64,
            strategy: ChunkingStrategy::Fixed,
            min_chunk_chars: 0,
        }
    }
}

impl ChunkingConfig {
    /// Check `max_chunk_chars > 0`, `overlap_chars < max_chunk_chars` and
    /// `min_chunk_chars <= max_chunk_chars`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] when a constraint is violated.
    pub fn validate(&self) -> Result<()> {
        validate_chunk_params(self.max_chunk_chars, self.overlap_chars)?;
        if self.min_chunk_chars > self.max_chunk_chars {
            return Err(RagError::InvalidConfiguration(format!(
                "min_chunk_chars ({}) must not exceed max_chunk_chars ({})",
                self.min_chunk_chars, self.max_chunk_chars
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_chunk_params(max_chunk_chars: usize, overlap_chars: usize) -> Result<()> {
    if max_chunk_chars == 0 {
        return Err(RagError::InvalidConfiguration(
            "max_chunk_chars must be greater than zero".to_string(),
        ));
    }
    if overlap_chars >= max_chunk_chars {
        return Err(RagError::InvalidConfiguration(format!(
            "overlap_chars ({overlap_chars}) must be less than max_chunk_chars ({max_chunk_chars})"
        )));
    }
    Ok(())
}

/// Per-call deadlines for each external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    /// Deadline for one embedding batch.
    #[serde(with = "duration_ms")]
    pub embedding: Duration,
    /// Deadline for one vector index call.
    #[serde(with = "duration_ms")]
    pub vector_index: Duration,
    /// Deadline for one metadata store call.
    #[serde(with = "duration_ms")]
    pub metadata_store: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            embedding: Duration::from_secs(30),
            vector_index: Duration::from_secs(10),
            metadata_store: Duration::from_secs(5),
        }
    }
}

/// Configuration shared by the ingestion pipeline and the search engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatentRagConfig {
    /// Chunk sizing.
    pub chunking: ChunkingConfig,
    /// Maximum number of texts sent to the embedding provider in one call.
    pub embed_batch_size: usize,
    /// Multiplier applied to `top_k` when querying the vector index, to absorb
    /// losses from per-patent deduplication and post-filtering.
    pub over_fetch_factor: usize,
    /// Per-call deadlines.
    pub timeouts: Timeouts,
    /// Retry policy for network-facing calls.
    pub retry: RetryPolicy,
}

impl Default for PatentRagConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            embed_batch_size: 64,
            over_fetch_factor: 3,
            timeouts: Timeouts::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PatentRagConfig {
    /// Create a new builder for constructing a [`PatentRagConfig`].
    pub fn builder() -> PatentRagConfigBuilder {
        PatentRagConfigBuilder::default()
    }

    /// Validate every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] describing the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embed_batch_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.over_fetch_factor == 0 {
            return Err(RagError::InvalidConfiguration(
                "over_fetch_factor must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::InvalidConfiguration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(RagError::InvalidConfiguration(format!(
                "retry.multiplier ({}) must be a finite value >= 1.0",
                self.retry.multiplier
            )));
        }
        let timeouts = &self.timeouts;
        for (name, value) in [
            ("embedding", timeouts.embedding),
            ("vector_index", timeouts.vector_index),
            ("metadata_store", timeouts.metadata_store),
        ] {
            if value.is_zero() {
                return Err(RagError::InvalidConfiguration(format!(
                    "timeouts.{name} must be non-zero"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`PatentRagConfig`].
#[derive(Debug, Clone, Default)]
pub struct PatentRagConfigBuilder {
    config: PatentRagConfig,
}

impl PatentRagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn max_chunk_chars(mut self, max: usize) -> Self {
        self.config.chunking.max_chunk_chars = max;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn overlap_chars(mut self, overlap: usize) -> Self {
        self.config.chunking.overlap_chars = overlap;
        self
    }

    /// Set the boundary lookback window in characters.
    pub fn boundary_lookback(mut self, lookback: usize) -> Self {
        self.config.chunking.boundary_lookback = lookback;
        self
    }

    /// Set the chunking strategy.
    pub fn strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.chunking.strategy = strategy;
        self
    }

    /// Set the size below which chunks are merged into a neighbour.
    pub fn min_chunk_chars(mut self, min: usize) -> Self {
        self.config.chunking.min_chunk_chars = min;
        self
    }

    /// Set the embedding batch size.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the vector index over-fetch factor.
    pub fn over_fetch_factor(mut self, factor: usize) -> Self {
        self.config.over_fetch_factor = factor;
        self
    }

    /// Set the per-call deadlines.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`PatentRagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if:
    /// - `max_chunk_chars == 0`, `overlap_chars >= max_chunk_chars` or
    ///   `min_chunk_chars > max_chunk_chars`
    /// - `embed_batch_size == 0` or `over_fetch_factor == 0`
    /// - the retry policy or a timeout is unusable
    pub fn build(self) -> Result<PatentRagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Serialize a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
