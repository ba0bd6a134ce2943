//! In-memory [`KnowledgeBaseStore`] implementation for tests.
//!
//! Uses `Vec`s behind `std::sync::RwLock`, preserving insertion order so
//! ordering contracts match the SQLite backend. The history sink can be
//! armed to fail via [`InMemoryStore::fail_history_appends`], letting tests
//! prove that history logging is best-effort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{KbError, Result};
use crate::models::{
    Document, DocumentSummary, KbStats, KnowledgeBase, KnowledgeBaseSummary, NewChunk,
    SearchHistoryEntry, StoredChunk,
};

use super::KnowledgeBaseStore;

struct MemChunk {
    id: String,
    document_id: String,
    chunk_index: i64,
    text: String,
    embedding: String,
}

struct HistoryRow {
    id: String,
    kb_id: String,
    user_id: String,
    query: String,
    result_count: i64,
    searched_at: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    kbs: RwLock<Vec<KnowledgeBase>>,
    docs: RwLock<Vec<Document>>,
    chunks: RwLock<Vec<MemChunk>>,
    history: RwLock<Vec<HistoryRow>>,
    fail_history: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the history sink to reject appends, simulating a logging outage.
    pub fn fail_history_appends(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn history_len(&self) -> usize {
        self.history.read().unwrap().len()
    }

    fn owns_kb(&self, kb_id: &str, user_id: &str) -> bool {
        self.kbs
            .read()
            .unwrap()
            .iter()
            .any(|kb| kb.id == kb_id && kb.user_id == user_id)
    }

    fn summarize(&self, kb: &KnowledgeBase) -> KnowledgeBaseSummary {
        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        let doc_ids: Vec<&str> = docs
            .iter()
            .filter(|d| d.kb_id == kb.id)
            .map(|d| d.id.as_str())
            .collect();
        let chunk_count = chunks
            .iter()
            .filter(|c| doc_ids.contains(&c.document_id.as_str()))
            .count() as i64;

        KnowledgeBaseSummary {
            id: kb.id.clone(),
            name: kb.name.clone(),
            description: kb.description.clone(),
            is_active: kb.is_active,
            created_at: kb.created_at,
            updated_at: kb.updated_at,
            document_count: doc_ids.len() as i64,
            chunk_count,
        }
    }
}

#[async_trait]
impl KnowledgeBaseStore for InMemoryStore {
    async fn create_knowledge_base(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<KnowledgeBase> {
        let now = chrono::Utc::now().timestamp();
        let kb = KnowledgeBase {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            description: description.map(|d| d.to_string()),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.kbs.write().unwrap().push(kb.clone());
        Ok(kb)
    }

    async fn get_knowledge_base(
        &self,
        kb_id: &str,
        user_id: &str,
    ) -> Result<Option<KnowledgeBaseSummary>> {
        let kb = {
            let kbs = self.kbs.read().unwrap();
            kbs.iter()
                .find(|kb| kb.id == kb_id && kb.user_id == user_id)
                .cloned()
        };
        Ok(kb.map(|kb| self.summarize(&kb)))
    }

    async fn list_knowledge_bases(&self, user_id: &str) -> Result<Vec<KnowledgeBaseSummary>> {
        let owned: Vec<KnowledgeBase> = {
            let kbs = self.kbs.read().unwrap();
            kbs.iter().filter(|kb| kb.user_id == user_id).cloned().collect()
        };
        let mut summaries: Vec<KnowledgeBaseSummary> =
            owned.iter().map(|kb| self.summarize(kb)).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn delete_knowledge_base(&self, kb_id: &str, user_id: &str) -> Result<()> {
        if !self.owns_kb(kb_id, user_id) {
            return Err(KbError::NotFoundOrForbidden);
        }

        let doc_ids: Vec<String> = {
            let docs = self.docs.read().unwrap();
            docs.iter()
                .filter(|d| d.kb_id == kb_id)
                .map(|d| d.id.clone())
                .collect()
        };

        self.history.write().unwrap().retain(|h| h.kb_id != kb_id);
        self.chunks
            .write()
            .unwrap()
            .retain(|c| !doc_ids.contains(&c.document_id));
        self.docs.write().unwrap().retain(|d| d.kb_id != kb_id);
        self.kbs.write().unwrap().retain(|kb| kb.id != kb_id);
        Ok(())
    }

    async fn save_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        if let Some(existing) = docs.iter_mut().find(|d| d.id == doc.id) {
            *existing = doc.clone();
        } else {
            docs.push(doc.clone());
        }
        Ok(())
    }

    async fn mark_document_processed(&self, doc_id: &str) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        if let Some(doc) = docs.iter_mut().find(|d| d.id == doc_id) {
            doc.processed = true;
            doc.processing_error = None;
        }
        Ok(())
    }

    async fn mark_document_failed(&self, doc_id: &str, reason: &str) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        if let Some(doc) = docs.iter_mut().find(|d| d.id == doc_id) {
            doc.processed = false;
            doc.processing_error = Some(reason.to_string());
        }
        Ok(())
    }

    async fn list_documents(&self, kb_id: &str, user_id: &str) -> Result<Vec<DocumentSummary>> {
        if !self.owns_kb(kb_id, user_id) {
            return Ok(Vec::new());
        }

        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();

        let mut summaries: Vec<DocumentSummary> = docs
            .iter()
            .filter(|d| d.kb_id == kb_id)
            .map(|d| DocumentSummary {
                id: d.id.clone(),
                filename: d.filename.clone(),
                file_type: d.file_type.clone(),
                file_size: d.file_size,
                processed: d.processed,
                processing_error: d.processing_error.clone(),
                uploaded_at: d.uploaded_at,
                chunk_count: chunks.iter().filter(|c| c.document_id == d.id).count() as i64,
            })
            .collect();
        summaries.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(summaries)
    }

    async fn delete_document(&self, doc_id: &str, kb_id: &str, user_id: &str) -> Result<()> {
        if !self.owns_kb(kb_id, user_id) {
            return Err(KbError::NotFoundOrForbidden);
        }

        let existed = {
            let docs = self.docs.read().unwrap();
            docs.iter().any(|d| d.id == doc_id && d.kb_id == kb_id)
        };
        if !existed {
            return Err(KbError::NotFoundOrForbidden);
        }

        self.chunks
            .write()
            .unwrap()
            .retain(|c| c.document_id != doc_id);
        self.docs.write().unwrap().retain(|d| d.id != doc_id);
        Ok(())
    }

    async fn save_chunks(&self, document_id: &str, chunks: &[NewChunk]) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        for chunk in chunks {
            stored.push(MemChunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                chunk_index: chunk.index,
                text: chunk.text.clone(),
                embedding: chunk.embedding.clone(),
            });
        }
        Ok(())
    }

    async fn chunks_for_search(&self, kb_id: &str, user_id: &str) -> Result<Vec<StoredChunk>> {
        if !self.owns_kb(kb_id, user_id) {
            return Ok(Vec::new());
        }

        let doc_filenames: Vec<(String, String)> = {
            let docs = self.docs.read().unwrap();
            docs.iter()
                .filter(|d| d.kb_id == kb_id)
                .map(|d| (d.id.clone(), d.filename.clone()))
                .collect()
        };

        let chunks = self.chunks.read().unwrap();
        let mut result: Vec<StoredChunk> = chunks
            .iter()
            .filter_map(|c| {
                doc_filenames
                    .iter()
                    .find(|(id, _)| *id == c.document_id)
                    .map(|(_, filename)| StoredChunk {
                        id: c.id.clone(),
                        document_id: c.document_id.clone(),
                        chunk_index: c.chunk_index,
                        text: c.text.clone(),
                        embedding: c.embedding.clone(),
                        filename: filename.clone(),
                    })
            })
            .collect();
        result.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        Ok(result)
    }

    async fn append_search_history(
        &self,
        kb_id: &str,
        user_id: &str,
        query: &str,
        result_count: usize,
    ) -> Result<()> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(KbError::Internal("history sink unavailable".to_string()));
        }

        self.history.write().unwrap().push(HistoryRow {
            id: Uuid::new_v4().to_string(),
            kb_id: kb_id.to_string(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            result_count: result_count as i64,
            searched_at: chrono::Utc::now().timestamp(),
        });
        Ok(())
    }

    async fn search_history(
        &self,
        kb_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchHistoryEntry>> {
        let history = self.history.read().unwrap();
        // Insertion order is chronological; reverse for newest-first.
        Ok(history
            .iter()
            .filter(|h| h.kb_id == kb_id && h.user_id == user_id)
            .rev()
            .take(limit)
            .map(|h| SearchHistoryEntry {
                id: h.id.clone(),
                query: h.query.clone(),
                result_count: h.result_count,
                searched_at: h.searched_at,
            })
            .collect())
    }

    async fn stats(&self, kb_id: &str, user_id: &str) -> Result<KbStats> {
        if !self.owns_kb(kb_id, user_id) {
            return Err(KbError::NotFoundOrForbidden);
        }

        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        let history = self.history.read().unwrap();

        let doc_ids: Vec<&str> = docs
            .iter()
            .filter(|d| d.kb_id == kb_id)
            .map(|d| d.id.as_str())
            .collect();
        let total_bytes: i64 = docs
            .iter()
            .filter(|d| d.kb_id == kb_id)
            .map(|d| d.file_size)
            .sum();
        let chunk_count = chunks
            .iter()
            .filter(|c| doc_ids.contains(&c.document_id.as_str()))
            .count() as i64;
        let kb_history: Vec<&HistoryRow> =
            history.iter().filter(|h| h.kb_id == kb_id).collect();
        let mut searchers: Vec<&str> = kb_history.iter().map(|h| h.user_id.as_str()).collect();
        searchers.sort_unstable();
        searchers.dedup();

        Ok(KbStats {
            document_count: doc_ids.len() as i64,
            chunk_count,
            total_bytes,
            search_count: kb_history.len() as i64,
            distinct_searchers: searchers.len() as i64,
        })
    }
}
