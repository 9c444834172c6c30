//! Error types for retrieval and document ingestion.

use superagent_chat::{ChatError, GatewayError};
use superagent_core::error::SuperagentError;

/// Errors from the retrieval layer.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("vector store returned {status}: {body}")]
    VectorStoreStatus { status: u16, body: String },
    #[error("answer generation failed: {0}")]
    Answer(#[from] GatewayError),
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl RagError {
    /// Whether the failure came from an external service.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RagError::Embedding(_)
                | RagError::VectorStore(_)
                | RagError::VectorStoreStatus { .. }
                | RagError::Answer(_)
        )
    }
}

impl From<RagError> for ChatError {
    fn from(err: RagError) -> Self {
        ChatError::Retrieval(err.to_string())
    }
}

impl From<RagError> for SuperagentError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Storage(msg) => SuperagentError::Storage(msg),
            RagError::Answer(e) => SuperagentError::Gateway(e.to_string()),
            other => SuperagentError::Retrieval(other.to_string()),
        }
    }
}
