//! Domain types shared between the chat pipeline, retrieval and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Retrieval
// =============================================================================

/// One chunk returned by a vector search, scoped to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedSnippet {
    /// Chunk text.
    pub content: String,
    /// Identifier of the document the chunk came from.
    pub document_id: String,
    /// Position of the chunk within its document.
    pub chunk_index: u32,
    /// Similarity score in `[0, 1]` (cosine).
    pub score: f32,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Remaining payload fields stored with the chunk.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Sort snippets by descending score. NaN scores sort last.
pub fn sort_by_score(snippets: &mut [RetrievedSnippet]) {
    snippets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// =============================================================================
// Documents
// =============================================================================

/// Ingestion state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// A document registered for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub metadata: serde_json::Value,
    pub status: DocumentStatus,
    pub chunk_count: u32,
    pub vector_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(content: &str, score: f32) -> RetrievedSnippet {
        RetrievedSnippet {
            content: content.to_string(),
            document_id: "doc-1".to_string(),
            chunk_index: 0,
            score,
            tenant_id: "acme".to_string(),
            file_name: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_sort_by_score_descending() {
        let mut snippets = vec![snippet("a", 0.71), snippet("b", 0.93), snippet("c", 0.8)];
        sort_by_score(&mut snippets);
        let order: Vec<&str> = snippets.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_snippet_serializes_camel_case() {
        let json = serde_json::to_value(snippet("hola", 0.9)).unwrap();
        assert_eq!(json["documentId"], "doc-1");
        assert_eq!(json["chunkIndex"], 0);
        assert_eq!(json["tenantId"], "acme");
        assert!(json.get("fileName").is_none());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_document_status_round_trip() {
        for status in [
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("archived"), None);
    }
}
