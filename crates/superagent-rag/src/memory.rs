//! In-process vector store with brute-force cosine similarity search.
//!
//! Used for local development without Qdrant and in tests. All searches are
//! O(n) over the collection.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::RagError;
use crate::vector::{matches_all, PointRecord, ScoredPoint, VectorQuery, VectorStore};

#[derive(Debug, Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    points: HashMap<String, StoredPoint>,
}

/// Thread-safe in-memory [`VectorStore`].
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Collection>>, RagError> {
        self.collections
            .read()
            .map_err(|e| RagError::VectorStore(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Collection>>, RagError> {
        self.collections
            .write()
            .map_err(|e| RagError::VectorStore(format!("Lock poisoned: {}", e)))
    }

    /// Number of points in `collection` (0 when it does not exist).
    pub fn point_count(&self, collection: &str) -> usize {
        self.read()
            .map(|c| c.get(collection).map_or(0, |c| c.points.len()))
            .unwrap_or(0)
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.read()
            .map(|c| c.contains_key(collection))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<(), RagError> {
        let mut collections = self.write()?;
        collections
            .entry(collection.to_string())
            .or_insert_with(|| {
                debug!(collection, dimensions, "Created in-memory collection");
                Collection {
                    dimensions,
                    points: HashMap::new(),
                }
            });
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<(), RagError> {
        let mut collections = self.write()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::VectorStoreStatus {
                status: 404,
                body: format!("collection {} not found", collection),
            })?;

        for point in points {
            if point.vector.len() != target.dimensions {
                return Err(RagError::VectorStore(format!(
                    "vector dimension {} does not match collection dimension {}",
                    point.vector.len(),
                    target.dimensions
                )));
            }
            target.points.insert(
                point.id,
                StoredPoint {
                    vector: point.vector,
                    payload: point.payload,
                },
            );
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &VectorQuery) -> Result<Vec<ScoredPoint>, RagError> {
        let collections = self.read()?;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<ScoredPoint> = target
            .points
            .iter()
            .filter(|(_, p)| query.matches(&p.payload))
            .map(|(id, p)| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(&query.vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| query.score_threshold.map_or(true, |t| hit.score >= t))
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), RagError> {
        let mut collections = self.write()?;
        if let Some(target) = collections.get_mut(collection) {
            for id in ids {
                target.points.remove(id);
            }
        }
        Ok(())
    }

    async fn first_vector(
        &self,
        collection: &str,
        must: &[(String, Value)],
    ) -> Result<Option<Vec<f32>>, RagError> {
        let collections = self.read()?;
        Ok(collections.get(collection).and_then(|target| {
            target
                .points
                .values()
                .find(|p| matches_all(must, &p.payload))
                .map(|p| p.vector.clone())
        }))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Cosine similarity of two vectors; 0.0 on length mismatch or zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: &str, vector: Vec<f32>, tenant: &str) -> PointRecord {
        PointRecord {
            id: id.to_string(),
            vector,
            payload: json!({"tenantId": tenant, "content": id})
                .as_object()
                .unwrap()
                .clone(),
        }
    }

    fn query(vector: Vec<f32>, threshold: Option<f32>) -> VectorQuery {
        VectorQuery {
            vector,
            limit: 10,
            score_threshold: threshold,
            must: vec![],
            must_not: vec![],
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_missing_collection_searches_empty() {
        let store = MemoryVectorStore::new();
        let hits = store.search("org_nobody", &query(vec![1.0, 0.0], None)).await.unwrap();
        assert!(hits.is_empty());
        store.delete_points("org_nobody", &["x".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_search_sorted_and_thresholded() {
        let store = MemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("close", vec![1.0, 0.1], "acme"),
                    point("exact", vec![1.0, 0.0], "acme"),
                    point("far", vec![0.0, 1.0], "acme"),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("c", &query(vec![1.0, 0.0], Some(0.7))).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "close"]);
    }

    #[tokio::test]
    async fn test_search_applies_filters_and_limit() {
        let store = MemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("a", vec![1.0, 0.0], "acme"),
                    point("b", vec![1.0, 0.0], "globex"),
                    point("c", vec![0.9, 0.1], "acme"),
                ],
            )
            .await
            .unwrap();

        let mut q = query(vec![1.0, 0.0], None);
        q.must = vec![("tenantId".to_string(), json!("acme"))];
        q.limit = 1;
        let hits = store.search("c", &q).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_search_must_not_and_first_vector() {
        let store = MemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![point("a", vec![1.0, 0.0], "acme"), point("b", vec![0.8, 0.2], "acme")],
            )
            .await
            .unwrap();

        let own = vec![("content".to_string(), json!("a"))];
        assert_eq!(store.first_vector("c", &own).await.unwrap(), Some(vec![1.0, 0.0]));
        let nothing = vec![("content".to_string(), json!("zzz"))];
        assert_eq!(store.first_vector("c", &nothing).await.unwrap(), None);
        assert_eq!(store.first_vector("missing", &own).await.unwrap(), None);

        let mut q = query(vec![1.0, 0.0], None);
        q.must_not = own;
        let hits = store.search("c", &q).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_upsert_requires_collection_and_dimension() {
        let store = MemoryVectorStore::new();
        let err = store.upsert("c", vec![point("a", vec![1.0], "t")]).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStoreStatus { status: 404, .. }));

        store.ensure_collection("c", 2).await.unwrap();
        let err = store.upsert("c", vec![point("a", vec![1.0], "t")]).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStore(_)));
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent_and_delete() {
        let store = MemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store.upsert("c", vec![point("a", vec![1.0, 0.0], "t")]).await.unwrap();
        store.ensure_collection("c", 2).await.unwrap();
        assert_eq!(store.point_count("c"), 1);

        store.delete_points("c", &["a".to_string()]).await.unwrap();
        assert_eq!(store.point_count("c"), 0);
        assert!(store.has_collection("c"));
    }
}
