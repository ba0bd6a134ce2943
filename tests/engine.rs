//! End-to-end pipeline and engine behavior over the in-memory store.

mod common;

use std::sync::Arc;

use common::{sentence_text, FailingProvider, HashProvider, StubProvider};
use kb_search::config::ChunkingConfig;
use kb_search::embedding::{serialize_vector, EmbeddingProvider};
use kb_search::engine::SemanticSearchEngine;
use kb_search::error::{EmbedContext, KbError};
use kb_search::ingest::IngestionOrchestrator;
use kb_search::models::{Document, NewChunk};
use kb_search::store::memory::InMemoryStore;
use kb_search::store::KnowledgeBaseStore;

fn orchestrator(
    store: Arc<InMemoryStore>,
    provider: Arc<dyn EmbeddingProvider>,
) -> IngestionOrchestrator {
    IngestionOrchestrator::new(store, provider, ChunkingConfig::default(), 64)
}

/// A document row a test writes directly into the store, bypassing ingestion.
fn plain_document(id: &str, kb_id: &str, filename: &str) -> Document {
    Document {
        id: id.to_string(),
        kb_id: kb_id.to_string(),
        filename: filename.to_string(),
        file_type: "txt".to_string(),
        content: String::new(),
        file_size: 0,
        processed: true,
        processing_error: None,
        uploaded_at: 0,
    }
}

fn chunk_with_vector(index: i64, text: &str, vector: &[f32]) -> NewChunk {
    NewChunk {
        index,
        text: text.to_string(),
        embedding: serialize_vector(vector).unwrap(),
        token_count: 1,
    }
}

/// A unit vector whose cosine similarity against `[1, 0]` is exactly `x`.
fn unit_vector_with_similarity(x: f32) -> Vec<f32> {
    vec![x, (1.0 - x * x).sqrt()]
}

#[tokio::test]
async fn five_thousand_char_document_yields_three_processed_chunks() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(HashProvider::new(16));
    let orch = orchestrator(store.clone(), provider.clone());

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();

    let text = sentence_text(5000);
    let summary = orch
        .ingest(&kb.id, "alice", text.as_bytes(), "notes.txt", "txt")
        .await
        .unwrap();

    assert_eq!(summary.chunk_count, 3);
    assert!(summary.token_count.get() > 0);

    let docs = store.list_documents(&kb.id, "alice").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert!(docs[0].processed);
    assert_eq!(docs[0].chunk_count, 3);

    // Ordinals start at 0 and increase without gaps.
    let chunks = store.chunks_for_search(&kb.id, "alice").await.unwrap();
    let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn empty_document_is_persisted_with_zero_chunks_and_no_provider_call() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(HashProvider::new(16));
    let orch = orchestrator(store.clone(), provider.clone());

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();

    let summary = orch
        .ingest(&kb.id, "alice", b"", "empty.txt", "txt")
        .await
        .unwrap();

    assert_eq!(summary.chunk_count, 0);
    assert_eq!(provider.call_count(), 0);

    let docs = store.list_documents(&kb.id, "alice").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert!(docs[0].processed);
    assert_eq!(docs[0].chunk_count, 0);
}

#[tokio::test]
async fn search_on_empty_knowledge_base_makes_no_provider_call() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(StubProvider::new(vec![1.0, 0.0]));
    let engine = SemanticSearchEngine::new(store.clone(), provider.clone());

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();

    let hits = engine.search(&kb.id, "alice", "anything", 5).await.unwrap();

    assert!(hits.is_empty());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn top_k_keeps_only_the_most_similar_chunk() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(StubProvider::new(vec![1.0, 0.0]));
    let engine = SemanticSearchEngine::new(store.clone(), provider.clone());

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();
    store
        .save_document(&plain_document("doc-a", &kb.id, "a.txt"))
        .await
        .unwrap();
    store
        .save_chunks(
            "doc-a",
            &[
                chunk_with_vector(0, "almost exact", &unit_vector_with_similarity(0.91)),
                chunk_with_vector(1, "close second", &unit_vector_with_similarity(0.90)),
            ],
        )
        .await
        .unwrap();

    let hits = engine.search(&kb.id, "alice", "query", 1).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "almost exact");
    assert!((hits[0].similarity - 0.91).abs() < 1e-3);
}

#[tokio::test]
async fn results_are_ordered_by_descending_similarity() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(StubProvider::new(vec![1.0, 0.0]));
    let engine = SemanticSearchEngine::new(store.clone(), provider.clone());

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();
    store
        .save_document(&plain_document("doc-a", &kb.id, "a.txt"))
        .await
        .unwrap();
    store
        .save_chunks(
            "doc-a",
            &[
                chunk_with_vector(0, "weak", &unit_vector_with_similarity(0.2)),
                chunk_with_vector(1, "strong", &unit_vector_with_similarity(0.95)),
                chunk_with_vector(2, "middling", &unit_vector_with_similarity(0.6)),
            ],
        )
        .await
        .unwrap();

    let hits = engine.search(&kb.id, "alice", "query", 10).await.unwrap();

    let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, vec!["strong", "middling", "weak"]);
    for pair in hits.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

#[tokio::test]
async fn equal_similarities_keep_insertion_order() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(StubProvider::new(vec![1.0, 0.0]));
    let engine = SemanticSearchEngine::new(store.clone(), provider.clone());

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();
    store
        .save_document(&plain_document("doc-a", &kb.id, "a.txt"))
        .await
        .unwrap();
    store
        .save_document(&plain_document("doc-b", &kb.id, "b.txt"))
        .await
        .unwrap();

    let shared = unit_vector_with_similarity(1.0);
    store
        .save_chunks("doc-a", &[chunk_with_vector(0, "first in", &shared)])
        .await
        .unwrap();
    store
        .save_chunks("doc-b", &[chunk_with_vector(0, "second in", &shared)])
        .await
        .unwrap();

    let hits = engine.search(&kb.id, "alice", "query", 10).await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].text, "first in");
    assert_eq!(hits[1].text, "second in");
}

#[tokio::test]
async fn provider_outage_leaves_unprocessed_document_with_reason() {
    let store = Arc::new(InMemoryStore::new());
    let orch = orchestrator(store.clone(), Arc::new(FailingProvider));

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();

    let err = orch
        .ingest(&kb.id, "alice", sentence_text(1000).as_bytes(), "doc.txt", "txt")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        KbError::EmbeddingGeneration {
            context: EmbedContext::Batch,
            ..
        }
    ));

    let docs = store.list_documents(&kb.id, "alice").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert!(!docs[0].processed);
    let reason = docs[0].processing_error.as_deref().unwrap();
    assert!(!reason.is_empty());

    let chunks = store.chunks_for_search(&kb.id, "alice").await.unwrap();
    assert!(chunks.is_empty());
}

#[tokio::test]
async fn search_history_records_queries_and_counts() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(StubProvider::new(vec![1.0, 0.0]));
    let engine = SemanticSearchEngine::new(store.clone(), provider);

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();
    store
        .save_document(&plain_document("doc-a", &kb.id, "a.txt"))
        .await
        .unwrap();
    store
        .save_chunks(
            "doc-a",
            &[chunk_with_vector(0, "text", &unit_vector_with_similarity(0.5))],
        )
        .await
        .unwrap();

    engine.search(&kb.id, "alice", "first query", 5).await.unwrap();
    engine.search(&kb.id, "alice", "second query", 5).await.unwrap();

    let history = store.search_history(&kb.id, "alice", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    // Newest first.
    assert_eq!(history[0].query, "second query");
    assert_eq!(history[0].result_count, 1);
}

#[tokio::test]
async fn history_logging_failure_does_not_fail_the_search() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(StubProvider::new(vec![1.0, 0.0]));
    let engine = SemanticSearchEngine::new(store.clone(), provider);

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();
    store
        .save_document(&plain_document("doc-a", &kb.id, "a.txt"))
        .await
        .unwrap();
    store
        .save_chunks(
            "doc-a",
            &[chunk_with_vector(0, "text", &unit_vector_with_similarity(0.5))],
        )
        .await
        .unwrap();

    store.fail_history_appends(true);
    let hits = engine.search(&kb.id, "alice", "query", 5).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(store.history_len(), 0);
}

#[tokio::test]
async fn ingest_into_foreign_knowledge_base_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(HashProvider::new(16));
    let orch = orchestrator(store.clone(), provider);

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();

    let err = orch
        .ingest(&kb.id, "mallory", b"some text.", "doc.txt", "txt")
        .await
        .unwrap_err();

    assert!(matches!(err, KbError::NotFoundOrForbidden));
    assert!(store
        .list_documents(&kb.id, "alice")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn search_in_foreign_knowledge_base_returns_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(StubProvider::new(vec![1.0, 0.0]));
    let engine = SemanticSearchEngine::new(store.clone(), provider.clone());

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();
    store
        .save_document(&plain_document("doc-a", &kb.id, "a.txt"))
        .await
        .unwrap();
    store
        .save_chunks(
            "doc-a",
            &[chunk_with_vector(0, "text", &unit_vector_with_similarity(0.5))],
        )
        .await
        .unwrap();

    let hits = engine.search(&kb.id, "mallory", "query", 5).await.unwrap();

    assert!(hits.is_empty());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn stored_vector_of_wrong_dimensionality_is_an_error() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(StubProvider::new(vec![1.0, 0.0]));
    let engine = SemanticSearchEngine::new(store.clone(), provider);

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();
    store
        .save_document(&plain_document("doc-a", &kb.id, "a.txt"))
        .await
        .unwrap();
    store
        .save_chunks("doc-a", &[chunk_with_vector(0, "text", &[1.0, 0.0, 0.0])])
        .await
        .unwrap();

    let err = engine.search(&kb.id, "alice", "query", 5).await.unwrap_err();
    assert!(matches!(err, KbError::DimensionMismatch { left: 2, right: 3 }));
}

#[tokio::test]
async fn deleting_a_knowledge_base_cascades_to_everything() {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(HashProvider::new(16));
    let orch = orchestrator(store.clone(), provider.clone());
    let engine = SemanticSearchEngine::new(store.clone(), provider);

    let kb = store
        .create_knowledge_base("alice", "notes", None)
        .await
        .unwrap();
    orch.ingest(&kb.id, "alice", sentence_text(3000).as_bytes(), "doc.txt", "txt")
        .await
        .unwrap();
    engine.search(&kb.id, "alice", "corpus", 5).await.unwrap();
    assert_eq!(store.history_len(), 1);

    store.delete_knowledge_base(&kb.id, "alice").await.unwrap();

    assert!(store
        .get_knowledge_base(&kb.id, "alice")
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.history_len(), 0);
    assert!(store
        .chunks_for_search(&kb.id, "alice")
        .await
        .unwrap()
        .is_empty());
}
