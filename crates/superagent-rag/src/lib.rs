//! Retrieval for SuperAgent.
//!
//! Embeds queries and documents, stores chunk vectors in a tenant-scoped
//! collection (Qdrant or in-process), answers questions grounded on the
//! retrieved chunks and keeps a SQLite registry of uploaded documents.

pub mod chunker;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod qdrant;
pub mod registry;
pub mod search;
pub mod vector;

pub use chunker::TextChunker;
pub use db::Database;
pub use documents::{DocumentPage, DocumentService, Upload};
pub use embedding::{DynEmbedder, Embedder, HashEmbedder, OpenAiEmbedder};
pub use error::RagError;
pub use memory::MemoryVectorStore;
pub use qdrant::QdrantStore;
pub use registry::DocumentRegistry;
pub use search::{Answer, AnswerRequest, RagService, SearchRequest};
pub use vector::{PointRecord, ScoredPoint, VectorQuery, VectorStore};
