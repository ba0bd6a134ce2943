//! Core record types flowing through ingestion and search.
//!
//! Timestamps are Unix seconds (UTC); identifiers are UUID strings.

use serde::Serialize;

use crate::segmenter::TokenEstimate;

/// A named, user-owned collection of documents forming one search scope.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A knowledge base enriched with live aggregate counts.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub document_count: i64,
    pub chunk_count: i64,
}

/// A stored upload. A failed ingestion keeps its row with `processed = false`
/// and a human-readable `processing_error` instead of disappearing.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub kb_id: String,
    pub filename: String,
    pub file_type: String,
    pub content: String,
    pub file_size: i64,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub uploaded_at: i64,
}

/// Listing view of a document: status and counts, no extracted content.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub uploaded_at: i64,
    pub chunk_count: i64,
}

/// A chunk ready to persist: ordinal, text, serialized vector, token estimate.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub index: i64,
    pub text: String,
    pub embedding: String,
    pub token_count: i64,
}

/// A persisted chunk as fetched for search, joined with its source filename.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: String,
    pub filename: String,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub text: String,
    pub filename: String,
    pub similarity: f32,
}

/// An append-only record of a query issued against a knowledge base.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHistoryEntry {
    pub id: String,
    pub query: String,
    pub result_count: i64,
    pub searched_at: i64,
}

/// Aggregate counters for one knowledge base.
#[derive(Debug, Clone, Serialize)]
pub struct KbStats {
    pub document_count: i64,
    pub chunk_count: i64,
    pub total_bytes: i64,
    pub search_count: i64,
    pub distinct_searchers: i64,
}

/// What a successful ingestion reports back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub document_id: String,
    pub filename: String,
    pub chunk_count: usize,
    pub token_count: TokenEstimate,
}
