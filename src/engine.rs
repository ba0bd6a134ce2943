//! Semantic search over a single knowledge base.
//!
//! The engine is deliberately exhaustive: every chunk of the knowledge base
//! is fetched and scored against the query vector. At the scale of one
//! knowledge base per tenant this trades throughput for exact ranking; an
//! approximate index would be an additive change behind the same contract.

use std::sync::Arc;

use crate::embedding::{self, EmbeddingProvider};
use crate::error::Result;
use crate::models::SearchHit;
use crate::store::KnowledgeBaseStore;

pub struct SemanticSearchEngine {
    store: Arc<dyn KnowledgeBaseStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SemanticSearchEngine {
    pub fn new(store: Arc<dyn KnowledgeBaseStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Rank the knowledge base's chunks against `query` and return the top
    /// `top_k`, ordered by descending cosine similarity. Equal scores keep
    /// their insertion order (stable sort).
    ///
    /// A knowledge base with no chunks returns an empty result without
    /// calling the embedding provider. The query is logged to search history
    /// on a best-effort basis; logging failures never fail the search.
    pub async fn search(
        &self,
        kb_id: &str,
        user_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // Fetch candidates before embedding so an empty knowledge base
        // costs no provider call.
        let chunks = self.store.chunks_for_search(kb_id, user_id).await?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embedding::embed_one(self.provider.as_ref(), query).await?;

        let mut hits = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = embedding::deserialize_vector(&chunk.embedding)?;
            let similarity = embedding::cosine_similarity(&query_vec, &vector)?;
            hits.push(SearchHit {
                chunk_id: chunk.id,
                text: chunk.text,
                filename: chunk.filename,
                similarity,
            });
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        if let Err(e) = self
            .store
            .append_search_history(kb_id, user_id, query, hits.len())
            .await
        {
            tracing::warn!(kb_id, error = %e, "failed to record search history");
        }

        tracing::info!(kb_id, results = hits.len(), "semantic search completed");
        Ok(hits)
    }
}
