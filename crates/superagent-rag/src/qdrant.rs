//! Qdrant REST client implementing [`VectorStore`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::RagError;
use crate::vector::{PointRecord, ScoredPoint, VectorQuery, VectorStore};

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<WireHit>,
}

#[derive(Deserialize)]
struct WireHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct ScrollResponse {
    result: ScrollPage,
}

#[derive(Deserialize)]
struct ScrollPage {
    #[serde(default)]
    points: Vec<ScrollPoint>,
}

#[derive(Deserialize)]
struct ScrollPoint {
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

/// Qdrant `match` conditions for payload equality.
fn conditions(pairs: &[(String, Value)]) -> Vec<Value> {
    pairs
        .iter()
        .map(|(key, value)| json!({"key": key, "match": {"value": value}}))
        .collect()
}

/// Point ids are UUID strings or unsigned integers on the wire.
fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// HTTP client for a Qdrant server.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        }
    }

    /// Send a request and return `(status, body)` without judging the status.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(u16, String), RagError> {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            req = req.header("api-key", key);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok((status, text))
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<(), RagError> {
        let path = format!("/collections/{}", collection);
        let (status, body) = self.send(Method::GET, &path, None).await?;
        if is_success(status) {
            return Ok(());
        }
        if status != 404 {
            return Err(RagError::VectorStoreStatus { status, body });
        }

        let params = json!({"vectors": {"size": dimensions, "distance": "Cosine"}});
        let (status, body) = self.send(Method::PUT, &path, Some(&params)).await?;
        // 409: created concurrently by another request
        if is_success(status) || status == 409 {
            info!(collection, dimensions, "Qdrant collection created");
            Ok(())
        } else {
            Err(RagError::VectorStoreStatus { status, body })
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<(), RagError> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let wire: Vec<Value> = points
            .into_iter()
            .map(|p| json!({"id": p.id, "vector": p.vector, "payload": p.payload}))
            .collect();
        let body = json!({ "points": wire });

        let path = format!("/collections/{}/points?wait=true", collection);
        let (status, text) = self.send(Method::PUT, &path, Some(&body)).await?;
        if !is_success(status) {
            warn!(collection, status, "Qdrant upsert rejected");
            return Err(RagError::VectorStoreStatus { status, body: text });
        }
        debug!(collection, count, "Points upserted");
        Ok(())
    }

    async fn search(&self, collection: &str, query: &VectorQuery) -> Result<Vec<ScoredPoint>, RagError> {
        let must = conditions(&query.must);
        let must_not = conditions(&query.must_not);
        let mut body = json!({
            "vector": query.vector,
            "limit": query.limit,
            "with_payload": true,
        });
        if let Some(threshold) = query.score_threshold {
            body["score_threshold"] = json!(threshold);
        }
        if !must.is_empty() || !must_not.is_empty() {
            body["filter"] = json!({ "must": must, "must_not": must_not });
        }

        let path = format!("/collections/{}/points/search", collection);
        let (status, text) = self.send(Method::POST, &path, Some(&body)).await?;
        if status == 404 {
            debug!(collection, "Collection does not exist yet, no documents loaded");
            return Ok(Vec::new());
        }
        if !is_success(status) {
            return Err(RagError::VectorStoreStatus { status, body: text });
        }

        let parsed: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| RagError::VectorStore(format!("malformed search response: {}", e)))?;
        let mut hits: Vec<ScoredPoint> = parsed
            .result
            .into_iter()
            .map(|h| ScoredPoint {
                id: id_to_string(&h.id),
                score: h.score,
                payload: h.payload.unwrap_or_default(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), RagError> {
        if ids.is_empty() {
            return Ok(());
        }
        let path = format!("/collections/{}/points/delete?wait=true", collection);
        let body = json!({ "points": ids });
        let (status, text) = self.send(Method::POST, &path, Some(&body)).await?;
        if is_success(status) || status == 404 {
            Ok(())
        } else {
            Err(RagError::VectorStoreStatus { status, body: text })
        }
    }

    async fn first_vector(
        &self,
        collection: &str,
        must: &[(String, Value)],
    ) -> Result<Option<Vec<f32>>, RagError> {
        let body = json!({
            "filter": { "must": conditions(must) },
            "limit": 1,
            "with_payload": false,
            "with_vector": true,
        });
        let path = format!("/collections/{}/points/scroll", collection);
        let (status, text) = self.send(Method::POST, &path, Some(&body)).await?;
        if status == 404 {
            return Ok(None);
        }
        if !is_success(status) {
            return Err(RagError::VectorStoreStatus { status, body: text });
        }

        let parsed: ScrollResponse = serde_json::from_str(&text)
            .map_err(|e| RagError::VectorStore(format!("malformed scroll response: {}", e)))?;
        Ok(parsed.result.points.into_iter().find_map(|p| p.vector))
    }

    fn backend_name(&self) -> &str {
        "qdrant"
    }
}
