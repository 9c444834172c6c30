//! Vector store abstraction over tenant collections.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::RagError;

/// A chunk vector with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// Nearest-neighbour query with payload equality filters.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    /// Minimum similarity for a hit to be returned.
    pub score_threshold: Option<f32>,
    /// Every `(key, value)` must equal the payload field.
    pub must: Vec<(String, Value)>,
    /// No `(key, value)` may equal the payload field.
    pub must_not: Vec<(String, Value)>,
}

/// Whether `payload` satisfies every equality condition.
pub fn matches_all(conditions: &[(String, Value)], payload: &Map<String, Value>) -> bool {
    conditions
        .iter()
        .all(|(key, value)| payload.get(key) == Some(value))
}

impl VectorQuery {
    /// Whether `payload` passes both the `must` and `must_not` filters.
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        matches_all(&self.must, payload)
            && !self
                .must_not
                .iter()
                .any(|(key, value)| payload.get(key) == Some(value))
    }
}

/// Collection-oriented vector database.
///
/// A collection that does not exist yet behaves as empty for `search` and
/// `delete_points`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection with cosine distance unless it already exists.
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<(), RagError>;

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<(), RagError>;

    /// Hits sorted by descending score.
    async fn search(&self, collection: &str, query: &VectorQuery) -> Result<Vec<ScoredPoint>, RagError>;

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), RagError>;

    /// Vector of one point whose payload equals every `must` condition.
    async fn first_vector(
        &self,
        collection: &str,
        must: &[(String, Value)],
    ) -> Result<Option<Vec<f32>>, RagError>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &str;
}
