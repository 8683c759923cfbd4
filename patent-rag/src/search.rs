//! Semantic patent search.
//!
//! The [`SearchEngine`] answers a query by embedding it, over-fetching the
//! nearest chunks from the vector index, resolving each chunk to its patent
//! record, keeping the best chunk per patent, ranking, applying structured
//! filters and truncating to `top_k`. When chunks left behind by a failed
//! cleanup push live matches out of the window, the window is widened a
//! bounded number of times.
//!
//! The engine is a pure reader and takes no locks. Dropping the future
//! returned by [`SearchEngine::search`] abandons any in-flight calls.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::config::PatentRagConfig;
use crate::document::{PatentRecord, ScoredChunk, SearchResult};
use crate::embedding::{EmbeddingClient, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::filter::SearchFilters;
use crate::ingest::missing;
use crate::metadata::MetadataStore;
use crate::vectorstore::VectorIndex;

/// Extra vector queries allowed when non-live chunks fill the window.
const MAX_REFETCHES: usize = 2;

/// Ranked, deduplicated results of one vector query.
struct Candidates {
    results: Vec<SearchResult>,
    /// Hits dropped as drift or as chunks of a non-live write.
    skipped: usize,
    /// Whether the index returned as many hits as requested.
    exhausted_window: bool,
}

/// The query orchestrator.
///
/// Construct one via [`SearchEngine::builder()`].
///
/// # Example
///
/// ```rust,ignore
/// let engine = SearchEngine::builder()
///     .config(PatentRagConfig::default())
///     .embedding_provider(embedder)
///     .vector_index(index)
///     .metadata_store(store)
///     .build()?;
///
/// let filters = SearchFilters::new().assignee("Tech Corp Inc.");
/// let results = engine.search("rotor blade cooling", 10, Some(&filters)).await?;
/// ```
pub struct SearchEngine {
    config: PatentRagConfig,
    embedder: EmbeddingClient,
    vector_index: Arc<dyn VectorIndex>,
    metadata_store: Arc<dyn MetadataStore>,
}

impl SearchEngine {
    /// Create a new [`SearchEngineBuilder`].
    pub fn builder() -> SearchEngineBuilder {
        SearchEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &PatentRagConfig {
        &self.config
    }

    /// Search for the `top_k` patents most similar to `query`.
    ///
    /// Returns at most one result per patent, ordered by descending score
    /// with ties broken by ascending patent id. When `filters` removes
    /// results, fewer than `top_k` are returned; the list is never padded.
    /// No matches yield an empty `Vec`.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] for a blank query or `top_k == 0`, before
    ///   any external call
    /// - embedding, vector index or metadata store errors once retries are
    ///   exhausted
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".to_string()));
        }
        if top_k == 0 {
            return Err(RagError::Validation("top_k must be greater than zero".to_string()));
        }

        // 1. Embed the query
        let query_vector = self.embedder.embed_query(query).await?;

        // 2. Over-fetch, widening the window while stale chunks crowd it
        let mut fetch = top_k.saturating_mul(self.config.over_fetch_factor);
        let mut refetches = 0;
        let mut results = loop {
            let candidates = self.candidates(&query_vector, fetch).await?;
            let short = candidates.results.len() < top_k;
            if !short || !candidates.exhausted_window || candidates.skipped == 0 {
                break candidates.results;
            }
            if refetches == MAX_REFETCHES {
                warn!(
                    top_k,
                    fetched = fetch,
                    skipped = candidates.skipped,
                    "stale chunks crowd the search window"
                );
                break candidates.results;
            }
            refetches += 1;
            fetch = fetch.saturating_mul(2);
            debug!(fetch, skipped = candidates.skipped, "widening search window");
        };

        // 5. Post-filter, never pad
        if let Some(filters) = filters.filter(|f| !f.is_empty()) {
            results.retain(|r| filters.matches(&r.metadata));
        }

        // 6. Truncate
        results.truncate(top_k);

        info!(top_k, fetched = fetch, result_count = results.len(), "search completed");
        Ok(results)
    }

    /// Query `fetch` chunks and reduce them to one ranked result per patent.
    async fn candidates(&self, query_vector: &[f32], fetch: usize) -> Result<Candidates> {
        let hits = self
            .config
            .retry
            .call("vector_index.query", self.config.timeouts.vector_index, || {
                self.vector_index.query(query_vector, fetch, None)
            })
            .await?;
        let exhausted_window = hits.len() >= fetch;
        if hits.is_empty() {
            return Ok(Candidates { results: Vec::new(), skipped: 0, exhausted_window });
        }

        // 3. Resolve each distinct patent once
        let records = self.resolve(&hits).await?;

        // 4. Keep the best live chunk per patent
        let mut skipped = 0;
        let mut best: HashMap<&str, ScoredChunk> = HashMap::new();
        for hit in hits {
            let Some(record) = records.get(hit.payload.source_id.as_str()) else {
                skipped += 1;
                continue;
            };
            if !record.is_live(&hit.payload) {
                debug!(
                    patent.id = %record.id,
                    chunk.id = %hit.id,
                    live.version = %record.version_tag,
                    live.revision = %record.revision,
                    "skipping chunk of a non-live write"
                );
                skipped += 1;
                continue;
            }
            if best.get(record.id.as_str()).is_none_or(|current| hit.score > current.score) {
                best.insert(record.id.as_str(), hit);
            }
        }

        let mut results: Vec<SearchResult> = best
            .into_iter()
            .filter_map(|(id, hit)| records.get(id).map(|record| SearchResult::new(hit, record)))
            .collect();
        results.sort_by(|a, b| {
            b.score.total_cmp(&a.score).then_with(|| a.patent_id.cmp(&b.patent_id))
        });

        Ok(Candidates { results, skipped, exhausted_window })
    }

    /// Fetch the canonical record for a patent.
    ///
    /// # Errors
    ///
    /// Returns the metadata store error once retries are exhausted.
    pub async fn get_patent(&self, patent_id: &str) -> Result<Option<PatentRecord>> {
        if patent_id.trim().is_empty() {
            return Err(RagError::Validation("patent id must not be empty".to_string()));
        }
        self.config
            .retry
            .call("metadata.get", self.config.timeouts.metadata_store, || {
                self.metadata_store.get(patent_id)
            })
            .await
    }

    /// Look up records for every distinct `source_id` in `hits`, concurrently.
    /// Missing records are logged as drift and left out.
    async fn resolve(&self, hits: &[ScoredChunk]) -> Result<HashMap<String, PatentRecord>> {
        let mut ids: Vec<&str> = hits.iter().map(|h| h.payload.source_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();

        let lookups = ids.into_iter().map(|id| async move {
            let record = self
                .config
                .retry
                .call("metadata.get", self.config.timeouts.metadata_store, || {
                    self.metadata_store.get(id)
                })
                .await?;
            Ok::<_, RagError>((id, record))
        });

        let mut records = HashMap::new();
        for (id, record) in try_join_all(lookups).await? {
            match record {
                Some(record) => {
                    records.insert(id.to_string(), record);
                }
                None => {
                    let drift = RagError::IndexMetadataDrift { patent_id: id.to_string() };
                    warn!(patent.id = %id, error = %drift, "dropping vector hit without metadata");
                }
            }
        }
        Ok(records)
    }
}

/// Builder for constructing a [`SearchEngine`].
///
/// All fields are required.
#[derive(Default)]
pub struct SearchEngineBuilder {
    config: Option<PatentRagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
}

impl SearchEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: PatentRagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for queries.
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

    /// Build the [`SearchEngine`].
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidConfiguration`] if a required field is missing or
    ///   the configuration is invalid
    /// - [`RagError::DimensionMismatch`] if the provider and index disagree
    pub fn build(self) -> Result<SearchEngine> {
        let config = self.config.ok_or_else(|| missing("config"))?;
        config.validate()?;
        let provider = self.embedding_provider.ok_or_else(|| missing("embedding_provider"))?;
        let vector_index = self.vector_index.ok_or_else(|| missing("vector_index"))?;
        let metadata_store = self.metadata_store.ok_or_else(|| missing("metadata_store"))?;

        let embedder = EmbeddingClient::new(
            provider,
            vector_index.dimensions(),
            config.embed_batch_size,
            config.timeouts.embedding,
            config.retry.clone(),
        )?;

        Ok(SearchEngine { config, embedder, vector_index, metadata_store })
    }
}
