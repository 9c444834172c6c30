//! Error types for the chat pipeline.

use superagent_core::error::SuperagentError;

use crate::gateway::GatewayError;

/// Errors from the chat pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("model gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("invalid role pattern '{pattern}': {reason}")]
    InvalidRolePattern { pattern: String, reason: String },
    #[error("retrieval error: {0}")]
    Retrieval(String),
}

impl From<ChatError> for SuperagentError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Gateway(e) => SuperagentError::Gateway(e.to_string()),
            ChatError::InvalidRolePattern { .. } => SuperagentError::Config(err.to_string()),
            ChatError::Retrieval(msg) => SuperagentError::Retrieval(msg),
        }
    }
}
