//! Document ingestion: extract, chunk, embed, index and register.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use superagent_core::config::RagConfig;
use superagent_core::types::{DocumentRecord, DocumentStatus};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker::TextChunker;
use crate::embedding::DynEmbedder;
use crate::error::RagError;
use crate::registry::DocumentRegistry;
use crate::search::{collection_name, DOCUMENT_KEY, TENANT_KEY};
use crate::vector::{PointRecord, VectorStore};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "json"];

/// A file received for ingestion.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Caller metadata copied onto every chunk.
    pub metadata: Map<String, Value>,
}

/// One page of a tenant's documents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub documents: Vec<DocumentRecord>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// Content type of `upload` when it can be read as text.
fn text_content_type(upload: &Upload) -> Option<String> {
    let declared = upload
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    if let Some(ct) = declared {
        let textual = ct.starts_with("text/")
            || ct == "application/json"
            || ct == "application/csv"
            || ct == "application/x-ndjson";
        return textual.then_some(ct);
    }

    let ext = upload
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())?;
    let ct = match ext.as_str() {
        "json" => "application/json",
        "csv" => "text/csv",
        "md" | "markdown" => "text/markdown",
        _ if TEXT_EXTENSIONS.contains(&ext.as_str()) => "text/plain",
        _ => return None,
    };
    Some(ct.to_string())
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Uploads, lists and deletes tenant documents.
pub struct DocumentService {
    embedder: Arc<dyn DynEmbedder>,
    store: Arc<dyn VectorStore>,
    registry: DocumentRegistry,
    chunker: TextChunker,
    collection_prefix: String,
    preview_chars: usize,
}

impl DocumentService {
    pub fn new(
        embedder: Arc<dyn DynEmbedder>,
        store: Arc<dyn VectorStore>,
        registry: DocumentRegistry,
        cfg: &RagConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            registry,
            chunker: TextChunker::new(cfg.chunk_size, cfg.chunk_overlap),
            collection_prefix: cfg.collection_prefix.clone(),
            preview_chars: cfg.preview_chars,
        }
    }

    /// Ingest a file and return its completed record.
    ///
    /// Unsupported or empty files are rejected before anything is stored.
    /// Failures after registration mark the record failed and are returned.
    pub async fn upload(&self, tenant: &str, upload: Upload) -> Result<DocumentRecord, RagError> {
        let file_type = text_content_type(&upload).ok_or_else(|| {
            RagError::UnsupportedFileType(
                upload
                    .content_type
                    .clone()
                    .unwrap_or_else(|| upload.file_name.clone()),
            )
        })?;

        let text = String::from_utf8(upload.bytes)
            .map_err(|_| RagError::InvalidDocument("file is not valid UTF-8 text".to_string()))?;
        if text.trim().is_empty() {
            return Err(RagError::InvalidDocument("file contains no text".to_string()));
        }

        let mut record = DocumentRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            file_name: upload.file_name,
            file_type,
            file_size: text.len() as u64,
            metadata: Value::Object(upload.metadata),
            status: DocumentStatus::Processing,
            chunk_count: 0,
            vector_ids: Vec::new(),
            content_preview: None,
            error: None,
            created_at: Utc::now(),
        };
        self.registry.insert(&record)?;

        match self.index(&record, &text).await {
            Ok(vector_ids) => {
                let content_preview = preview(&text, self.preview_chars);
                self.registry
                    .mark_completed(record.id, &vector_ids, Some(&content_preview))?;
                info!(
                    tenant = %tenant,
                    document_id = %record.id,
                    chunks = vector_ids.len(),
                    "Document indexed"
                );
                record.status = DocumentStatus::Completed;
                record.chunk_count = vector_ids.len() as u32;
                record.vector_ids = vector_ids;
                record.content_preview = Some(content_preview);
                Ok(record)
            }
            Err(e) => {
                warn!(tenant = %tenant, document_id = %record.id, error = %e, "Document indexing failed");
                if let Err(mark_err) = self.registry.mark_failed(record.id, &e.to_string()) {
                    warn!(document_id = %record.id, error = %mark_err, "Failed to record indexing failure");
                }
                Err(e)
            }
        }
    }

    async fn index(&self, record: &DocumentRecord, text: &str) -> Result<Vec<String>, RagError> {
        let chunks = self.chunker.split(text);
        if chunks.is_empty() {
            return Err(RagError::InvalidDocument("file contains no text".to_string()));
        }

        let vectors = self.embedder.embed_boxed(&chunks).await?;
        let collection = collection_name(&self.collection_prefix, &record.tenant_id);
        self.store
            .ensure_collection(&collection, self.embedder.dimensions())
            .await?;

        let total = chunks.len();
        let mut ids = Vec::with_capacity(total);
        let points: Vec<PointRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (content, vector))| {
                let mut payload = match &record.metadata {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                payload.insert("content".to_string(), Value::String(content));
                payload.insert(DOCUMENT_KEY.to_string(), Value::String(record.id.to_string()));
                payload.insert(TENANT_KEY.to_string(), Value::String(record.tenant_id.clone()));
                payload.insert("fileName".to_string(), Value::String(record.file_name.clone()));
                payload.insert("fileType".to_string(), Value::String(record.file_type.clone()));
                payload.insert("chunkIndex".to_string(), Value::from(i));
                payload.insert("totalChunks".to_string(), Value::from(total));

                let id = Uuid::new_v4().to_string();
                ids.push(id.clone());
                PointRecord { id, vector, payload }
            })
            .collect();

        self.store.upsert(&collection, points).await?;
        Ok(ids)
    }

    /// Newest-first page of the tenant's documents. `page` is 1-based.
    pub fn list(&self, tenant: &str, page: u32, limit: u32) -> Result<DocumentPage, RagError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let documents = self.registry.list(tenant, page, limit)?;
        let total = self.registry.count(tenant)?;
        Ok(DocumentPage {
            documents,
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit)),
        })
    }

    pub fn get(&self, tenant: &str, id: Uuid) -> Result<DocumentRecord, RagError> {
        self.registry
            .find(tenant, id)?
            .ok_or_else(|| RagError::NotFound(format!("document {}", id)))
    }

    /// Remove a document's vectors, then its record.
    pub async fn delete(&self, tenant: &str, id: Uuid) -> Result<(), RagError> {
        let record = self.get(tenant, id)?;
        if !record.vector_ids.is_empty() {
            let collection = collection_name(&self.collection_prefix, tenant);
            self.store.delete_points(&collection, &record.vector_ids).await?;
        }
        self.registry.delete(tenant, id)?;
        info!(tenant = %tenant, document_id = %id, "Document deleted");
        Ok(())
    }
}
