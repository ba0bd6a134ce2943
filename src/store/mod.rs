//! Storage abstraction for knowledge bases, documents, chunks, and history.
//!
//! The [`KnowledgeBaseStore`] trait defines every persistence operation the
//! ingestion pipeline and search engine need, enabling pluggable backends.
//! Every read and write of a knowledge base or its descendants is scoped by
//! the owning user: a record that exists but belongs to someone else behaves
//! exactly like a record that does not exist.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Document, DocumentSummary, KbStats, KnowledgeBase, KnowledgeBaseSummary, NewChunk,
    SearchHistoryEntry, StoredChunk,
};

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_knowledge_base`](KnowledgeBaseStore::create_knowledge_base) | Create a named search scope for a user |
/// | [`get_knowledge_base`](KnowledgeBaseStore::get_knowledge_base) | Fetch one, enriched with live counts |
/// | [`list_knowledge_bases`](KnowledgeBaseStore::list_knowledge_bases) | All for a user, newest first |
/// | [`delete_knowledge_base`](KnowledgeBaseStore::delete_knowledge_base) | Cascade-delete documents, chunks, history |
/// | [`save_document`](KnowledgeBaseStore::save_document) | Upsert a document record |
/// | [`mark_document_processed`](KnowledgeBaseStore::mark_document_processed) | Flip the processed flag after chunks land |
/// | [`mark_document_failed`](KnowledgeBaseStore::mark_document_failed) | Record a failure reason |
/// | [`list_documents`](KnowledgeBaseStore::list_documents) | Summaries with chunk counts, no content |
/// | [`delete_document`](KnowledgeBaseStore::delete_document) | Delete one document and its chunks |
/// | [`save_chunks`](KnowledgeBaseStore::save_chunks) | Bulk insert, all-or-nothing |
/// | [`chunks_for_search`](KnowledgeBaseStore::chunks_for_search) | Every chunk of a knowledge base, insertion order |
/// | [`append_search_history`](KnowledgeBaseStore::append_search_history) | Append-only query log |
/// | [`search_history`](KnowledgeBaseStore::search_history) | Recent queries, newest first |
/// | [`stats`](KnowledgeBaseStore::stats) | Aggregate counters |
#[async_trait]
pub trait KnowledgeBaseStore: Send + Sync {
    async fn create_knowledge_base(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<KnowledgeBase>;

    /// `None` when the knowledge base is absent or owned by another user.
    async fn get_knowledge_base(
        &self,
        kb_id: &str,
        user_id: &str,
    ) -> Result<Option<KnowledgeBaseSummary>>;

    async fn list_knowledge_bases(&self, user_id: &str) -> Result<Vec<KnowledgeBaseSummary>>;

    /// Fails with [`KbError::NotFoundOrForbidden`](crate::error::KbError::NotFoundOrForbidden)
    /// unless the caller owns the knowledge base; otherwise deletes it and
    /// every owned document, chunk, and history record.
    async fn delete_knowledge_base(&self, kb_id: &str, user_id: &str) -> Result<()>;

    /// Insert or update a document record. Also used to persist failed
    /// ingestions, so the row carries the processed flag and error reason.
    async fn save_document(&self, doc: &Document) -> Result<()>;

    async fn mark_document_processed(&self, doc_id: &str) -> Result<()>;

    async fn mark_document_failed(&self, doc_id: &str, reason: &str) -> Result<()>;

    async fn list_documents(&self, kb_id: &str, user_id: &str) -> Result<Vec<DocumentSummary>>;

    async fn delete_document(&self, doc_id: &str, kb_id: &str, user_id: &str) -> Result<()>;

    /// Bulk-insert chunks in index order. All-or-nothing: a partial failure
    /// must leave no chunk rows behind, so the document is never marked
    /// processed with an incomplete set.
    async fn save_chunks(&self, document_id: &str, chunks: &[NewChunk]) -> Result<()>;

    /// Every chunk of the knowledge base, ordered by `(document_id,
    /// chunk_index)` — the original insertion order, which ranking relies on
    /// for stable tie-breaking.
    async fn chunks_for_search(&self, kb_id: &str, user_id: &str) -> Result<Vec<StoredChunk>>;

    /// Append-only; the search engine treats failures here as non-fatal.
    async fn append_search_history(
        &self,
        kb_id: &str,
        user_id: &str,
        query: &str,
        result_count: usize,
    ) -> Result<()>;

    async fn search_history(
        &self,
        kb_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchHistoryEntry>>;

    async fn stats(&self, kb_id: &str, user_id: &str) -> Result<KbStats>;
}
