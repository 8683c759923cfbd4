//! End-to-end ingestion behaviour against in-memory backends.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{BagOfWordsEmbedder, DIM, Harness, patent, test_config, text_about};
use patent_rag::{
    ChunkingStrategy, IngestStep, IngestionPipeline, InMemoryMetadataStore, InMemoryVectorIndex,
    MetadataStore, PatentRagConfig, RagError, RetryPolicy, chunk,
};

#[tokio::test]
async fn ingest_writes_chunks_and_record() {
    let h = Harness::new();
    let doc = patent("US1", "Laser cutter", &text_about("laser", 6));
    let expected = chunk("US1", &doc.full_text, 100, 20).unwrap().len();

    let result = h.pipeline.ingest(&doc, "v1").await.unwrap();
    assert_eq!(result.chunks_written, expected);
    assert_eq!(result.chunks_removed, 0);

    let stored = h.index.inner.chunks_for("US1").await;
    assert_eq!(stored.len(), expected);
    assert!(stored.iter().all(|c| c.version_tag == "v1"));

    let record = h.store.get("US1").await.unwrap().unwrap();
    assert_eq!(record.version_tag, "v1");
    assert_eq!(record.chunk_count, expected);
    assert_eq!(record.title, "Laser cutter");
}

#[tokio::test]
async fn reingesting_the_same_version_is_idempotent() {
    let h = Harness::new();
    let doc = patent("US1", "Laser cutter", &text_about("laser", 6));

    let first = h.pipeline.ingest(&doc, "v1").await.unwrap();
    let before = h.index.inner.chunks_for("US1").await;

    let second = h.pipeline.ingest(&doc, "v1").await.unwrap();
    assert_eq!(second.chunks_written, first.chunks_written);
    assert_eq!(second.chunks_removed, 0);
    assert_eq!(h.index.inner.chunks_for("US1").await, before);
    assert_eq!(h.index.inner.len().await, first.chunks_written);
    assert_eq!(h.store.inner.len().await, 1);
}

#[tokio::test]
async fn new_version_replaces_every_old_chunk() {
    let h = Harness::new();
    let v1 = patent("US1", "Laser cutter", &text_about("laser", 10));
    let v2 = patent("US1", "Laser cutter", "A shorter laser text.");

    let first = h.pipeline.ingest(&v1, "v1").await.unwrap();
    assert!(first.chunks_written > 1);

    let second = h.pipeline.ingest(&v2, "v2").await.unwrap();
    assert_eq!(second.chunks_written, 1);
    assert_eq!(second.chunks_removed, first.chunks_written);

    let stored = h.index.inner.chunks_for("US1").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].version_tag, "v2");
    assert_eq!(h.store.get("US1").await.unwrap().unwrap().version_tag, "v2");
}

#[tokio::test]
async fn shrinking_reingest_under_the_same_tag_drops_the_old_tail() {
    let h = Harness::new();
    let long = patent("US1", "Laser cutter", &text_about("laser", 10));
    let first = h.pipeline.ingest(&long, "v1").await.unwrap();
    assert!(first.chunks_written > 1);

    let short = patent("US1", "Laser cutter", "A plasma torch.");
    let second = h.pipeline.ingest(&short, "v1").await.unwrap();
    assert_eq!(second.chunks_written, 1);
    assert_eq!(second.chunks_removed, first.chunks_written);

    let stored = h.index.inner.chunks_for("US1").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "A plasma torch.");
    let record = h.store.get("US1").await.unwrap().unwrap();
    assert_eq!(record.chunk_count, 1);
    assert_eq!(record.revision, stored[0].revision);

    let results = h.engine.search("laser assembly embodiment", 1, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].matched_chunk_text, "A plasma torch.");
}

#[tokio::test]
async fn failed_same_tag_rewrite_keeps_the_live_content_intact() {
    let h = Harness::new();
    let original = patent("US1", "Laser cutter", &text_about("laser", 6));
    h.pipeline.ingest(&original, "v1").await.unwrap();
    let before = h.index.inner.chunks_for("US1").await;
    let live = h.store.get("US1").await.unwrap().unwrap();

    let edited = patent("US1", "Laser cutter", &text_about("plasma", 6));

    // Half of the new chunks land before the index gives up.
    h.index.partial_upsert.store(true, Ordering::SeqCst);
    match h.pipeline.ingest(&edited, "v1").await.unwrap_err() {
        RagError::IngestFailed { step, chunks_committed, .. } => {
            assert_eq!(step, IngestStep::Index);
            assert_eq!(chunks_committed, 0);
        }
        other => panic!("expected IngestFailed, got {other:?}"),
    }
    assert_eq!(h.index.inner.chunks_for("US1").await, before);
    h.index.partial_upsert.store(false, Ordering::SeqCst);

    // Every new chunk lands, then the commit fails.
    h.store.fail_put.store(true, Ordering::SeqCst);
    let err = h.pipeline.ingest(&edited, "v1").await.unwrap_err();
    assert_eq!(err.ingest_step(), Some(IngestStep::Metadata));
    assert_eq!(h.index.inner.chunks_for("US1").await, before);

    let record = h.store.get("US1").await.unwrap().unwrap();
    assert_eq!(record.revision, live.revision);
    let results = h.engine.search("plasma", 1, None).await.unwrap();
    assert!(results[0].matched_chunk_text.contains("laser"));
    assert!(!results[0].matched_chunk_text.contains("plasma"));
}

#[tokio::test]
async fn embedding_failure_mid_document_touches_neither_store() {
    // 240 characters with 100/20 windows gives exactly three chunks.
    let text: String = "abcd ".repeat(48);
    assert_eq!(chunk("US1", &text, 100, 20).unwrap().len(), 3);

    let h = Harness::with(test_config(1), BagOfWordsEmbedder::new(DIM).failing_on_batch(2));
    let err = h.pipeline.ingest(&patent("US1", "Widget", &text), "v1").await.unwrap_err();

    match err {
        RagError::IngestFailed { step, chunks_committed, source, .. } => {
            assert_eq!(step, IngestStep::Embed);
            assert_eq!(chunks_committed, 0);
            assert!(matches!(*source, RagError::EmbeddingUnavailable { succeeded: 1, .. }));
        }
        other => panic!("expected IngestFailed, got {other:?}"),
    }
    assert!(h.index.inner.is_empty().await);
    assert!(h.store.inner.is_empty().await);
}

#[tokio::test]
async fn upsert_failure_leaves_previous_version_live() {
    let h = Harness::new();
    let v1 = patent("US1", "Laser cutter", &text_about("laser", 4));
    h.pipeline.ingest(&v1, "v1").await.unwrap();
    let before = h.index.inner.chunks_for("US1").await;

    h.index.fail_upsert.store(true, Ordering::SeqCst);
    let v2 = patent("US1", "Laser cutter", &text_about("plasma", 4));
    let err = h.pipeline.ingest(&v2, "v2").await.unwrap_err();

    assert_eq!(err.ingest_step(), Some(IngestStep::Index));
    assert_eq!(h.index.inner.chunks_for("US1").await, before);
    assert_eq!(h.store.get("US1").await.unwrap().unwrap().version_tag, "v1");
}

#[tokio::test]
async fn metadata_failure_rolls_back_staged_chunks() {
    let h = Harness::new();
    let v1 = patent("US1", "Laser cutter", &text_about("laser", 4));
    h.pipeline.ingest(&v1, "v1").await.unwrap();
    let before = h.index.inner.chunks_for("US1").await;

    h.store.fail_put.store(true, Ordering::SeqCst);
    let v2 = patent("US1", "Laser cutter", &text_about("plasma", 7));
    match h.pipeline.ingest(&v2, "v2").await.unwrap_err() {
        RagError::IngestFailed { step, chunks_committed, .. } => {
            assert_eq!(step, IngestStep::Metadata);
            assert_eq!(chunks_committed, 0);
        }
        other => panic!("expected IngestFailed, got {other:?}"),
    }

    assert_eq!(h.index.inner.chunks_for("US1").await, before);
    assert_eq!(h.store.get("US1").await.unwrap().unwrap().version_tag, "v1");
}

#[tokio::test]
async fn failed_reingest_of_live_version_keeps_its_chunks() {
    let h = Harness::new();
    let doc = patent("US1", "Laser cutter", &text_about("laser", 4));
    let first = h.pipeline.ingest(&doc, "v1").await.unwrap();

    h.store.fail_put.store(true, Ordering::SeqCst);
    match h.pipeline.ingest(&doc, "v1").await.unwrap_err() {
        RagError::IngestFailed { chunks_committed, .. } => {
            assert_eq!(chunks_committed, first.chunks_written);
        }
        other => panic!("expected IngestFailed, got {other:?}"),
    }
    assert_eq!(h.index.inner.len().await, first.chunks_written);
}

#[tokio::test]
async fn cleanup_failure_is_reported_after_commit() {
    let h = Harness::new();
    h.pipeline.ingest(&patent("US1", "Laser", &text_about("laser", 4)), "v1").await.unwrap();

    h.index.fail_delete_by_filter.store(true, Ordering::SeqCst);
    let v2 = patent("US1", "Laser", "Plasma torch.");
    match h.pipeline.ingest(&v2, "v2").await.unwrap_err() {
        RagError::IngestFailed { step, chunks_committed, .. } => {
            assert_eq!(step, IngestStep::Cleanup);
            assert_eq!(chunks_committed, 1);
        }
        other => panic!("expected IngestFailed, got {other:?}"),
    }

    // The new version is committed; stale chunks linger but search skips them.
    assert_eq!(h.store.get("US1").await.unwrap().unwrap().version_tag, "v2");
    let results = h.engine.search("laser assembly", 5, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].matched_chunk_text, "Plasma torch.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingests_of_one_patent_never_interleave() {
    let h = Arc::new(Harness::new());
    let short = patent("US1", "Laser", "Short laser text.");
    let long = patent("US1", "Laser", &text_about("laser", 9));

    for round in 0..10 {
        let (tag_a, tag_b) = (format!("a{round}"), format!("b{round}"));
        let (a, b) =
            tokio::join!(h.pipeline.ingest(&short, &tag_a), h.pipeline.ingest(&long, &tag_b));
        a.unwrap();
        b.unwrap();

        let record = h.store.get("US1").await.unwrap().unwrap();
        let stored = h.index.inner.chunks_for("US1").await;
        assert_eq!(stored.len(), record.chunk_count);
        assert!(stored.iter().all(|c| c.version_tag == record.version_tag));
    }
}

#[tokio::test]
async fn remove_deletes_chunks_and_record() {
    let h = Harness::new();
    let written = h
        .pipeline
        .ingest(&patent("US1", "Laser", &text_about("laser", 5)), "v1")
        .await
        .unwrap()
        .chunks_written;
    h.pipeline.ingest(&patent("US2", "Pump", &text_about("pump", 2)), "v1").await.unwrap();

    assert_eq!(h.pipeline.remove("US1").await.unwrap(), written);
    assert!(h.index.inner.chunks_for("US1").await.is_empty());
    assert!(h.store.get("US1").await.unwrap().is_none());
    assert!(h.store.get("US2").await.unwrap().is_some());

    // Removing again is a no-op.
    assert_eq!(h.pipeline.remove("US1").await.unwrap(), 0);
}

#[tokio::test]
async fn batch_reports_each_document() {
    let h = Harness::new();
    let docs = vec![
        patent("US1", "Laser", &text_about("laser", 3)),
        patent("US2", "Empty", "   "),
        patent("US3", "Pump", &text_about("pump", 3)),
    ];

    let report = h.pipeline.ingest_batch(&docs, "v1", 2).await;
    let ok: Vec<_> = report.succeeded.iter().map(|r| r.patent_id.as_str()).collect();
    assert_eq!(ok, vec!["US1", "US3"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "US2");
    assert!(matches!(report.failed[0].1, RagError::Validation(_)));
    assert_eq!(report.chunks_written(), h.index.inner.len().await);
}

#[tokio::test]
async fn invalid_documents_are_rejected_before_any_call() {
    let h = Harness::new();
    for (doc, tag) in [
        (patent("", "Title", "text"), "v1"),
        (patent("US1", "Title", ""), "v1"),
        (patent("US1", "Title", "text"), " "),
    ] {
        let err = h.pipeline.ingest(&doc, tag).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)), "{err:?}");
    }
    assert_eq!(h.embedder.calls(), 0);
    assert!(h.index.inner.is_empty().await);
}

#[tokio::test]
async fn section_strategy_labels_chunks() {
    let config = PatentRagConfig::builder()
        .max_chunk_chars(100)
        .overlap_chars(20)
        .strategy(ChunkingStrategy::Sections)
        .retry(RetryPolicy::none())
        .build()
        .unwrap();
    let h = Harness::with(config, BagOfWordsEmbedder::new(DIM));
    let text = "ABSTRACT\nA laser cutter.\nCLAIMS\n1. A laser cutter comprising a lens.";
    h.pipeline.ingest(&patent("US1", "Laser", text), "v1").await.unwrap();

    let sections: Vec<_> = h
        .index
        .inner
        .chunks_for("US1")
        .await
        .into_iter()
        .filter_map(|c| c.section)
        .collect();
    assert_eq!(sections, vec!["abstract", "claims"]);
}

#[tokio::test]
async fn paragraph_strategy_packs_and_merges_small_tails() {
    let text = format!("{}\n\nTiny.", "z".repeat(100));
    let offsets = |min_chunk_chars: usize| {
        let text = text.clone();
        async move {
            let config = PatentRagConfig::builder()
                .max_chunk_chars(60)
                .overlap_chars(10)
                .strategy(ChunkingStrategy::Paragraphs)
                .min_chunk_chars(min_chunk_chars)
                .retry(RetryPolicy::none())
                .build()
                .unwrap();
            let h = Harness::with(config, BagOfWordsEmbedder::new(DIM));
            h.pipeline.ingest(&patent("US1", "Widget", &text), "v1").await.unwrap();
            h.index
                .inner
                .chunks_for("US1")
                .await
                .into_iter()
                .map(|c| (c.sequence_index, c.char_start, c.char_end))
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(offsets(0).await, vec![(0, 0, 60), (1, 50, 100), (2, 102, 107)]);
    assert_eq!(offsets(20).await, vec![(0, 0, 60), (1, 50, 107)]);
}

#[test]
fn builder_rejects_mismatched_dimensions() {
    let err = IngestionPipeline::builder()
        .config(PatentRagConfig::default())
        .embedding_provider(Arc::new(BagOfWordsEmbedder::new(8)))
        .vector_index(Arc::new(InMemoryVectorIndex::new(16)))
        .metadata_store(Arc::new(InMemoryMetadataStore::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 16, actual: 8 }));
}

#[test]
fn builder_requires_every_backend() {
    let err = IngestionPipeline::builder()
        .config(PatentRagConfig::default())
        .embedding_provider(Arc::new(BagOfWordsEmbedder::new(8)))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, RagError::InvalidConfiguration(_)));
}
