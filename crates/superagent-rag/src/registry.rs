//! SQLite-backed registry of uploaded documents.
//!
//! Every query is scoped by tenant: a document id from another tenant
//! behaves as missing.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use superagent_core::types::{DocumentRecord, DocumentStatus};
use uuid::Uuid;

use crate::db::Database;
use crate::error::RagError;

const SELECT_COLUMNS: &str = "id, tenant_id, file_name, file_type, file_size, metadata, status, \
     chunk_count, vector_ids, content_preview, error, created_at";

/// Repository for [`DocumentRecord`]s.
pub struct DocumentRegistry {
    db: Arc<Database>,
}

impl DocumentRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new record.
    pub fn insert(&self, doc: &DocumentRecord) -> Result<(), RagError> {
        let metadata = serde_json::to_string(&doc.metadata)
            .map_err(|e| RagError::Storage(e.to_string()))?;
        let vector_ids = serde_json::to_string(&doc.vector_ids)
            .map_err(|e| RagError::Storage(e.to_string()))?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (id, tenant_id, file_name, file_type, file_size, metadata,
                                        status, chunk_count, vector_ids, content_preview, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    doc.id.to_string(),
                    doc.tenant_id,
                    doc.file_name,
                    doc.file_type,
                    doc.file_size as i64,
                    metadata,
                    doc.status.as_str(),
                    doc.chunk_count,
                    vector_ids,
                    doc.content_preview,
                    doc.error,
                    doc.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| RagError::Storage(format!("Failed to save document: {}", e)))?;
            Ok(())
        })
    }

    /// Mark ingestion finished.
    pub fn mark_completed(
        &self,
        id: Uuid,
        vector_ids: &[String],
        content_preview: Option<&str>,
    ) -> Result<(), RagError> {
        let ids = serde_json::to_string(vector_ids).map_err(|e| RagError::Storage(e.to_string()))?;
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE documents
                 SET status = 'completed', chunk_count = ?2, vector_ids = ?3,
                     content_preview = ?4, error = NULL
                 WHERE id = ?1",
                rusqlite::params![id.to_string(), vector_ids.len() as i64, ids, content_preview],
            )
            .map_err(|e| RagError::Storage(format!("Failed to update document: {}", e)))?;
            Ok(())
        })
    }

    /// Mark ingestion failed with the reason.
    pub fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RagError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE documents SET status = 'failed', error = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), error],
            )
            .map_err(|e| RagError::Storage(format!("Failed to update document: {}", e)))?;
            Ok(())
        })
    }

    /// Find a tenant's document by id.
    pub fn find(&self, tenant: &str, id: Uuid) -> Result<Option<DocumentRecord>, RagError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM documents WHERE id = ?1 AND tenant_id = ?2",
                    SELECT_COLUMNS
                ))
                .map_err(|e| RagError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string(), tenant], |row| {
                    Ok(row_to_document(row))
                })
                .optional()
                .map_err(|e| RagError::Storage(e.to_string()))?;

            match result {
                Some(doc) => Ok(Some(doc?)),
                None => Ok(None),
            }
        })
    }

    /// One page of a tenant's documents, newest first. `page` is 1-based.
    pub fn list(&self, tenant: &str, page: u32, limit: u32) -> Result<Vec<DocumentRecord>, RagError> {
        let offset = i64::from(page.max(1) - 1) * i64::from(limit);
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM documents
                     WHERE tenant_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2 OFFSET ?3",
                    SELECT_COLUMNS
                ))
                .map_err(|e| RagError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![tenant, i64::from(limit), offset], |row| {
                    Ok(row_to_document(row))
                })
                .map_err(|e| RagError::Storage(e.to_string()))?;

            let mut docs = Vec::new();
            for row in rows {
                let doc = row.map_err(|e| RagError::Storage(e.to_string()))??;
                docs.push(doc);
            }
            Ok(docs)
        })
    }

    /// Number of documents owned by `tenant`.
    pub fn count(&self, tenant: &str) -> Result<u64, RagError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM documents WHERE tenant_id = ?1",
                    rusqlite::params![tenant],
                    |row| row.get(0),
                )
                .map_err(|e| RagError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    /// Delete a tenant's document. Returns whether a row was removed.
    pub fn delete(&self, tenant: &str, id: Uuid) -> Result<bool, RagError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM documents WHERE id = ?1 AND tenant_id = ?2",
                    rusqlite::params![id.to_string(), tenant],
                )
                .map_err(|e| RagError::Storage(format!("Failed to delete document: {}", e)))?;
            Ok(removed > 0)
        })
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> Result<DocumentRecord, RagError> {
    let storage = |e: rusqlite::Error| RagError::Storage(e.to_string());

    let id: String = row.get(0).map_err(storage)?;
    let metadata: String = row.get(5).map_err(storage)?;
    let status: String = row.get(6).map_err(storage)?;
    let vector_ids: String = row.get(8).map_err(storage)?;
    let created_ms: i64 = row.get(11).map_err(storage)?;
    let file_size: i64 = row.get(4).map_err(storage)?;

    Ok(DocumentRecord {
        id: Uuid::parse_str(&id).map_err(|e| RagError::Storage(format!("Invalid UUID: {}", e)))?,
        tenant_id: row.get(1).map_err(storage)?,
        file_name: row.get(2).map_err(storage)?,
        file_type: row.get(3).map_err(storage)?,
        file_size: file_size.max(0) as u64,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| RagError::Storage(format!("Invalid metadata: {}", e)))?,
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| RagError::Storage(format!("Invalid status: {}", status)))?,
        chunk_count: row.get(7).map_err(storage)?,
        vector_ids: serde_json::from_str(&vector_ids)
            .map_err(|e| RagError::Storage(format!("Invalid vector ids: {}", e)))?,
        content_preview: row.get(9).map_err(storage)?,
        error: row.get(10).map_err(storage)?,
        created_at: Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .ok_or_else(|| RagError::Storage(format!("Invalid timestamp: {}", created_ms)))?,
    })
}
