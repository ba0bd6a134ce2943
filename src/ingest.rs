//! Ingestion pipeline orchestration.
//!
//! Coordinates the full upload flow: ownership check → parse → clean →
//! chunk → batch-embed → persist. Failures are visible, not silent: a
//! parse or embedding failure still persists the document row, unprocessed,
//! with a human-readable reason, so the upload shows up in listings and can
//! be retried or removed.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{KbError, Result};
use crate::models::{Document, IngestSummary, NewChunk};
use crate::segmenter;
use crate::store::KnowledgeBaseStore;

pub struct IngestionOrchestrator {
    store: Arc<dyn KnowledgeBaseStore>,
    provider: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestionOrchestrator {
    pub fn new(
        store: Arc<dyn KnowledgeBaseStore>,
        provider: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            provider,
            chunking,
            batch_size,
        }
    }

    /// Ingest one uploaded document into a knowledge base the caller owns.
    ///
    /// The document and its chunks are persisted atomically from the
    /// caller's perspective: the processed flag is only set after every
    /// chunk row is in place, and a partial chunk write rolls back.
    pub async fn ingest(
        &self,
        kb_id: &str,
        user_id: &str,
        bytes: &[u8],
        filename: &str,
        declared_type: &str,
    ) -> Result<IngestSummary> {
        if self.store.get_knowledge_base(kb_id, user_id).await?.is_none() {
            return Err(KbError::NotFoundOrForbidden);
        }

        let document_id = Uuid::new_v4().to_string();
        let mut doc = Document {
            id: document_id.clone(),
            kb_id: kb_id.to_string(),
            filename: filename.to_string(),
            file_type: declared_type.to_ascii_lowercase(),
            content: String::new(),
            file_size: bytes.len() as i64,
            processed: false,
            processing_error: None,
            uploaded_at: Utc::now().timestamp(),
        };

        let text = match crate::parser::parse_document(bytes, declared_type) {
            Ok(text) => text,
            Err(e) => {
                self.persist_failure(&doc, &e).await;
                return Err(e);
            }
        };

        let cleaned = segmenter::clean_text(&text);
        let chunk_texts = segmenter::chunk_with_overlap(
            &cleaned,
            self.chunking.chunk_size,
            self.chunking.overlap,
        );
        let token_count = segmenter::estimate_tokens(&cleaned);
        doc.content = cleaned;

        if chunk_texts.is_empty() {
            // Nothing to embed; the document is still recorded, processed,
            // with zero chunks.
            doc.processed = true;
            self.store.save_document(&doc).await?;
            tracing::info!(document_id = %doc.id, "ingested empty document");
            return Ok(IngestSummary {
                document_id,
                filename: filename.to_string(),
                chunk_count: 0,
                token_count,
            });
        }

        let vectors = match embedding::embed_many(
            self.provider.as_ref(),
            &chunk_texts,
            self.batch_size,
        )
        .await
        {
            Ok(vectors) => vectors,
            Err(e) => {
                self.persist_failure(&doc, &e).await;
                return Err(e);
            }
        };

        self.store.save_document(&doc).await?;

        let mut chunks = Vec::with_capacity(chunk_texts.len());
        for (i, (text, vector)) in chunk_texts.iter().zip(vectors.iter()).enumerate() {
            chunks.push(NewChunk {
                index: i as i64,
                text: text.clone(),
                embedding: embedding::serialize_vector(vector)?,
                token_count: segmenter::estimate_tokens(text).get() as i64,
            });
        }

        if let Err(e) = self.store.save_chunks(&document_id, &chunks).await {
            // The rolled-back document stays unprocessed; record why.
            let _ = self
                .store
                .mark_document_failed(&document_id, &e.to_string())
                .await;
            return Err(e);
        }

        self.store.mark_document_processed(&document_id).await?;

        tracing::info!(
            document_id = %document_id,
            chunks = chunks.len(),
            "document ingested"
        );

        Ok(IngestSummary {
            document_id,
            filename: filename.to_string(),
            chunk_count: chunks.len(),
            token_count,
        })
    }

    /// Best-effort persistence of a failed upload. The original error is
    /// re-raised by the caller; a secondary storage failure here must not
    /// mask it.
    async fn persist_failure(&self, doc: &Document, cause: &KbError) {
        let mut failed = doc.clone();
        failed.processed = false;
        failed.processing_error = Some(cause.to_string());

        tracing::error!(document_id = %doc.id, error = %cause, "ingestion failed");

        if let Err(e) = self.store.save_document(&failed).await {
            tracing::warn!(document_id = %doc.id, error = %e, "could not record ingestion failure");
        }
    }
}
