//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use superagent_chat::ChatOrchestrator;
use superagent_core::config::SuperagentConfig;
use superagent_rag::{DocumentService, RagService};

/// Retrieval services, present only when `[rag].enabled` is set.
#[derive(Clone)]
pub struct RagServices {
    pub search: Arc<RagService>,
    pub documents: Arc<DocumentService>,
}

/// Shared application state.
///
/// Cloned into every handler task; all services sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SuperagentConfig>,
    pub chat: Arc<ChatOrchestrator>,
    pub rag: Option<RagServices>,
    /// Server start time for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: SuperagentConfig, chat: ChatOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            chat: Arc::new(chat),
            rag: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_rag(mut self, search: Arc<RagService>, documents: Arc<DocumentService>) -> Self {
        self.rag = Some(RagServices { search, documents });
        self
    }
}
