//! SQLite-backed [`KnowledgeBaseStore`] implementation.
//!
//! Wraps a [`SqlitePool`] and translates every store method into one or more
//! SQL statements. Cascading deletes run inside a transaction, children
//! first, so a crash cannot orphan chunk or history rows.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{KbError, Result};
use crate::models::{
    Document, DocumentSummary, KbStats, KnowledgeBase, KnowledgeBaseSummary, NewChunk,
    SearchHistoryEntry, StoredChunk,
};

use super::KnowledgeBaseStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// True when the knowledge base exists and belongs to `user_id`.
    async fn owns_kb(&self, kb_id: &str, user_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM knowledge_bases WHERE id = ? AND user_id = ?",
        )
        .bind(kb_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl KnowledgeBaseStore for SqliteStore {
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

        sqlx::query(
            r#"
            INSERT INTO knowledge_bases (id, user_id, name, description, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&kb.id)
        .bind(&kb.user_id)
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(kb.is_active)
        .bind(kb.created_at)
        .bind(kb.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(kb)
    }

    async fn get_knowledge_base(
        &self,
        kb_id: &str,
        user_id: &str,
    ) -> Result<Option<KnowledgeBaseSummary>> {
        let row = sqlx::query(
            r#"
            SELECT kb.id, kb.name, kb.description, kb.is_active, kb.created_at, kb.updated_at,
                   COUNT(DISTINCT d.id) AS document_count,
                   COUNT(DISTINCT c.id) AS chunk_count
            FROM knowledge_bases kb
            LEFT JOIN documents d ON d.kb_id = kb.id
            LEFT JOIN chunks c ON c.document_id = d.id
            WHERE kb.id = ? AND kb.user_id = ?
            GROUP BY kb.id
            "#,
        )
        .bind(kb_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| KnowledgeBaseSummary {
            id: r.get("id"),
            name: r.get("name"),
            description: r.get("description"),
            is_active: r.get("is_active"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
            document_count: r.get("document_count"),
            chunk_count: r.get("chunk_count"),
        }))
    }

    async fn list_knowledge_bases(&self, user_id: &str) -> Result<Vec<KnowledgeBaseSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT kb.id, kb.name, kb.description, kb.is_active, kb.created_at, kb.updated_at,
                   COUNT(DISTINCT d.id) AS document_count,
                   COUNT(DISTINCT c.id) AS chunk_count
            FROM knowledge_bases kb
            LEFT JOIN documents d ON d.kb_id = kb.id
            LEFT JOIN chunks c ON c.document_id = d.id
            WHERE kb.user_id = ?
            GROUP BY kb.id
            ORDER BY kb.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| KnowledgeBaseSummary {
                id: r.get("id"),
                name: r.get("name"),
                description: r.get("description"),
                is_active: r.get("is_active"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
                document_count: r.get("document_count"),
                chunk_count: r.get("chunk_count"),
            })
            .collect())
    }

    async fn delete_knowledge_base(&self, kb_id: &str, user_id: &str) -> Result<()> {
        if !self.owns_kb(kb_id, user_id).await? {
            return Err(KbError::NotFoundOrForbidden);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM search_history WHERE kb_id = ?")
            .bind(kb_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM chunks WHERE document_id IN (SELECT id FROM documents WHERE kb_id = ?)",
        )
        .bind(kb_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM documents WHERE kb_id = ?")
            .bind(kb_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM knowledge_bases WHERE id = ? AND user_id = ?")
            .bind(kb_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, kb_id, filename, file_type, content, file_size,
                                   processed, processing_error, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                processed = excluded.processed,
                processing_error = excluded.processing_error
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.kb_id)
        .bind(&doc.filename)
        .bind(&doc.file_type)
        .bind(&doc.content)
        .bind(doc.file_size)
        .bind(doc.processed)
        .bind(&doc.processing_error)
        .bind(doc.uploaded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_document_processed(&self, doc_id: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET processed = 1, processing_error = NULL WHERE id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_document_failed(&self, doc_id: &str, reason: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET processed = 0, processing_error = ? WHERE id = ?")
            .bind(reason)
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_documents(&self, kb_id: &str, user_id: &str) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.filename, d.file_type, d.file_size, d.processed,
                   d.processing_error, d.uploaded_at,
                   COUNT(c.id) AS chunk_count
            FROM documents d
            JOIN knowledge_bases kb ON kb.id = d.kb_id
            LEFT JOIN chunks c ON c.document_id = d.id
            WHERE d.kb_id = ? AND kb.user_id = ?
            GROUP BY d.id
            ORDER BY d.uploaded_at DESC
            "#,
        )
        .bind(kb_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| DocumentSummary {
                id: r.get("id"),
                filename: r.get("filename"),
                file_type: r.get("file_type"),
                file_size: r.get("file_size"),
                processed: r.get("processed"),
                processing_error: r.get("processing_error"),
                uploaded_at: r.get("uploaded_at"),
                chunk_count: r.get("chunk_count"),
            })
            .collect())
    }

    async fn delete_document(&self, doc_id: &str, kb_id: &str, user_id: &str) -> Result<()> {
        if !self.owns_kb(kb_id, user_id).await? {
            return Err(KbError::NotFoundOrForbidden);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM documents WHERE id = ? AND kb_id = ?")
            .bind(doc_id)
            .bind(kb_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(KbError::NotFoundOrForbidden);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_chunks(&self, document_id: &str, chunks: &[NewChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, embedding, token_count)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(document_id)
            .bind(chunk.index)
            .bind(&chunk.text)
            .bind(&chunk.embedding)
            .bind(chunk.token_count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn chunks_for_search(&self, kb_id: &str, user_id: &str) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.text, c.embedding, d.filename
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            JOIN knowledge_bases kb ON kb.id = d.kb_id
            WHERE d.kb_id = ? AND kb.user_id = ?
            ORDER BY c.document_id, c.chunk_index
            "#,
        )
        .bind(kb_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| StoredChunk {
                id: r.get("id"),
                document_id: r.get("document_id"),
                chunk_index: r.get("chunk_index"),
                text: r.get("text"),
                embedding: r.get("embedding"),
                filename: r.get("filename"),
            })
            .collect())
    }

    async fn append_search_history(
        &self,
        kb_id: &str,
        user_id: &str,
        query: &str,
        result_count: usize,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_history (id, kb_id, user_id, query, result_count, searched_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(kb_id)
        .bind(user_id)
        .bind(query)
        .bind(result_count as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn search_history(
        &self,
        kb_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, query, result_count, searched_at
            FROM search_history
            WHERE kb_id = ? AND user_id = ?
            ORDER BY searched_at DESC
            LIMIT ?
            "#,
        )
        .bind(kb_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| SearchHistoryEntry {
                id: r.get("id"),
                query: r.get("query"),
                result_count: r.get("result_count"),
                searched_at: r.get("searched_at"),
            })
            .collect())
    }

    async fn stats(&self, kb_id: &str, user_id: &str) -> Result<KbStats> {
        if !self.owns_kb(kb_id, user_id).await? {
            return Err(KbError::NotFoundOrForbidden);
        }

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM documents WHERE kb_id = ?) AS document_count,
                (SELECT COUNT(*) FROM chunks c
                    JOIN documents d ON c.document_id = d.id
                    WHERE d.kb_id = ?) AS chunk_count,
                (SELECT COALESCE(SUM(file_size), 0) FROM documents WHERE kb_id = ?) AS total_bytes,
                (SELECT COUNT(*) FROM search_history WHERE kb_id = ?) AS search_count,
                (SELECT COUNT(DISTINCT user_id) FROM search_history WHERE kb_id = ?) AS distinct_searchers
            "#,
        )
        .bind(kb_id)
        .bind(kb_id)
        .bind(kb_id)
        .bind(kb_id)
        .bind(kb_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(KbStats {
            document_count: row.get("document_count"),
            chunk_count: row.get("chunk_count"),
            total_bytes: row.get("total_bytes"),
            search_count: row.get("search_count"),
            distinct_searchers: row.get("distinct_searchers"),
        })
    }
}
