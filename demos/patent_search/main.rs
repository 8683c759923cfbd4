//! # Patent Search Demo
//!
//! Loads a handful of patents from JSON, ingests them, replaces one with a
//! newer revision, and runs a few searches with and without filters.
//!
//! Uses in-memory backends and a deterministic `BagOfWordsEmbedder`, so it
//! runs with **zero API keys**.
//!
//! Run: `RUST_LOG=patent_rag=debug cargo run -p patent-rag-demos --bin patent_search`

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use patent_rag::{
    ChunkingStrategy, EmbeddingProvider, InMemoryMetadataStore, InMemoryVectorIndex,
    IngestionPipeline, PatentRagConfig, SearchEngine, SearchFilters, parse_patents_json,
};
use tracing::info;

const DIMENSIONS: usize = 128;

const PATENTS: &str = r#"[
  {
    "id": "US10123456B2",
    "title": "Cooling channel for a turbine rotor blade",
    "abstract": "A rotor blade with internal cooling channels.",
    "inventors": ["Jane Smith", "John Doe"],
    "assignee": "Turbo Dynamics Inc.",
    "publication_date": "2019-11-12",
    "classification_codes": ["F01D 5/18"],
    "description": "BACKGROUND\nTurbine blades operate at temperatures above the melting point of the alloy.\nDETAILED DESCRIPTION\nCooling air enters the root of the rotor blade and flows through a serpentine channel. Turbulators along the channel walls increase heat transfer.",
    "claims": ["1. A rotor blade comprising a serpentine cooling channel.", "2. The rotor blade of claim 1, wherein the channel has turbulators."],
    "country": "US"
  },
  {
    "id": "EP3456789A1",
    "title": "Secure key exchange for constrained devices",
    "abstract": "A lightweight key exchange protocol.",
    "inventors": "Maria Rossi",
    "assignee": "Cipher Labs",
    "publication_date": "03/15/2021",
    "classification_codes": ["H04L 9/08"],
    "description": "SUMMARY\nConstrained devices cannot afford full public key operations. The protocol derives a session key from a pre-shared secret and a nonce.",
    "claims": "1. A method of deriving a session key from a pre-shared secret and a nonce.",
    "country": "EP"
  },
  {
    "id": "US11222333B1",
    "title": "Heat exchanger with folded fins",
    "inventors": ["Akira Tanaka"],
    "assignee": "Turbo Dynamics Inc.",
    "publication_date": "2022-06-01 00:00:00",
    "classification_codes": ["F28F 1/12"],
    "full_text": "A heat exchanger has folded fins brazed between flat tubes. The fin pitch varies along the air flow direction to balance heat transfer and pressure drop.",
    "country": "US"
  },
  {
    "title": "Record without an id is skipped"
  }
]"#;

/// Deterministic bag-of-words embeddings: each lowercase word is hashed into
/// a bucket and the counts are L2-normalised, so shared words mean similarity.
struct BagOfWordsEmbedder {
    dimensions: usize,
}

#[async_trait::async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> patent_rag::Result<Vec<f32>> {
        let mut emb = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            emb[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("patent_search=info".parse()?),
        )
        .init();

    // -- 1. Shared backends ------------------------------------------------
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(BagOfWordsEmbedder { dimensions: DIMENSIONS });
    let index = Arc::new(InMemoryVectorIndex::new(DIMENSIONS));
    let store = Arc::new(InMemoryMetadataStore::new());

    let config = PatentRagConfig::builder()
        .max_chunk_chars(160)
        .overlap_chars(30)
        .strategy(ChunkingStrategy::Sections)
        .build()?;

    let pipeline = IngestionPipeline::builder()
        .config(config.clone())
        .embedding_provider(embedder.clone())
        .vector_index(index.clone())
        .metadata_store(store.clone())
        .build()?;

    let engine = SearchEngine::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_index(index.clone())
        .metadata_store(store)
        .build()?;

    // -- 2. Load and ingest ------------------------------------------------
    let mut patents = parse_patents_json(PATENTS)?;
    println!("Loaded {} patent(s)", patents.len());

    let report = pipeline.ingest_batch(&patents, "2024-01", 4).await;
    for result in &report.succeeded {
        println!("  {} → {} chunk(s)", result.patent_id, result.chunks_written);
    }
    for (id, error) in &report.failed {
        println!("  {id} failed: {error}");
    }

    // -- 3. Replace one patent with a revised text -------------------------
    let revised = &mut patents[2];
    revised.full_text.push_str(" A hydrophilic coating on the fins drains condensate.");
    let result = pipeline.ingest(revised, "2024-02").await?;
    info!(
        patent.id = %result.patent_id,
        chunks_written = result.chunks_written,
        chunks_removed = result.chunks_removed,
        "re-ingested revised patent"
    );
    println!("Index holds {} chunk(s)", index.len().await);

    // -- 4. Search ---------------------------------------------------------
    let turbo = SearchFilters::new().assignee("Turbo Dynamics Inc.");
    let cutoff = NaiveDate::from_ymd_opt(2020, 1, 1).context("invalid cutoff date")?;
    let recent = SearchFilters::new().published_after(cutoff);
    let queries: [(&str, Option<&SearchFilters>); 4] = [
        ("cooling channel in a rotor blade", None),
        ("session key from a shared secret", None),
        ("heat transfer", Some(&turbo)),
        ("heat transfer", Some(&recent)),
    ];

    for (query, filters) in queries {
        let label = if filters.is_some() { " (filtered)" } else { "" };
        println!("\nQuery: \"{query}\"{label}");
        let results = engine.search(query, 3, filters).await?;
        if results.is_empty() {
            println!("  (no results)");
        }
        for (i, hit) in results.iter().enumerate() {
            let preview: String = hit.matched_chunk_text.chars().take(70).collect();
            println!(
                "  {}. [score={:.4}] {} | {} [{}] | {preview}",
                i + 1,
                hit.score,
                hit.patent_id,
                hit.title,
                hit.matched_section.as_deref().unwrap_or("-"),
            );
        }
    }

    if let Some(record) = engine.get_patent("EP3456789A1").await? {
        println!("\n{} is live at version {}", record.id, record.version_tag);
    }

    println!("\nDone.");
    Ok(())
}
