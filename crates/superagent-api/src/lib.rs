//! SuperAgent HTTP surface: axum router, handlers, SSE streaming and
//! tenant resolution.
//!
//! Exposes the chat endpoints (`/api/chat`, `/api/chat/stream`,
//! `/api/reset`), liveness and status probes, and the `/rag` document
//! retrieval endpoints when retrieval is enabled.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::{AppState, RagServices};
