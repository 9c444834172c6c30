//! Embedding service trait and implementations.
//!
//! - `OpenAiEmbedder` calls an OpenAI-compatible `/embeddings` endpoint
//!   (text-embedding-3-small by default). This is the production backend.
//! - `HashEmbedder` produces deterministic hash-based unit vectors for local
//!   development and tests.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use superagent_core::config::EmbeddingConfig;
use tracing::{debug, warn};

use crate::error::RagError;

/// Service turning texts into fixed-dimensional vectors.
pub trait Embedder: Send + Sync {
    /// Embed every text, returning vectors in input order.
    fn embed(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send;

    /// Dimensionality of produced vectors.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`Embedder`] for dynamic dispatch.
///
/// A blanket implementation covers every `Embedder`, so services can hold
/// an `Arc<dyn DynEmbedder>` without generics.
pub trait DynEmbedder: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: Embedder> DynEmbedder for T {
    fn embed_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send + 'a>> {
        Box::pin(self.embed(texts))
    }

    fn dimensions(&self) -> usize {
        Embedder::dimensions(self)
    }
}

/// Embed a single query text.
pub async fn embed_one(embedder: &dyn DynEmbedder, text: &str) -> Result<Vec<f32>, RagError> {
    let texts = [text.to_string()];
    embedder
        .embed_boxed(&texts)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RagError::Embedding("no embedding returned".to_string()))
}

// ---------------------------------------------------------------------------
// OpenAiEmbedder
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// reqwest-backed embedder for OpenAI-compatible APIs.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Self {
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
            model: model.into(),
            dimensions,
        }
    }

    pub fn from_config(cfg: &EmbeddingConfig) -> Self {
        Self::new(
            cfg.base_url.clone(),
            cfg.api_key.clone(),
            cfg.model.clone(),
            cfg.dimensions,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RagError::Embedding("no API key configured".to_string()))?;

        debug!(model = %self.model, inputs = texts.len(), "Requesting embeddings");

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Embedding request rejected");
            return Err(RagError::Embedding(format!("{}: {}", status.as_u16(), body)));
        }

        let mut parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Embedding(format!("malformed response: {}", e)))?;
        if parsed.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// HashEmbedder
// ---------------------------------------------------------------------------

/// Deterministic embedder: identical texts map to identical unit vectors.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(1536)
    }
}

impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        texts
            .iter()
            .map(|t| {
                if t.is_empty() {
                    Err(RagError::Embedding("cannot embed empty text".to_string()))
                } else {
                    Ok(self.hash_to_vector(t))
                }
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    // ---- HashEmbedder ----

    #[tokio::test]
    async fn test_hash_embedder_dimension_and_determinism() {
        let e = HashEmbedder::new(64);
        let a = e.embed(&["same".to_string(), "same".to_string()]).await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].len(), 64);
        assert_eq!(a[0], a[1]);
    }

    #[tokio::test]
    async fn test_hash_embedder_unit_norm() {
        let e = HashEmbedder::new(32);
        let v = e.embed(&["norm".to_string()]).await.unwrap().remove(0);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_hash_embedder_rejects_empty() {
        let e = HashEmbedder::new(8);
        assert!(e.embed(&[String::new()]).await.is_err());
    }

    #[tokio::test]
    async fn test_embed_one_through_dyn() {
        let e: Arc<dyn DynEmbedder> = Arc::new(HashEmbedder::new(16));
        let v = embed_one(e.as_ref(), "hola").await.unwrap();
        assert_eq!(v.len(), 16);
        assert_eq!(e.dimensions(), 16);
    }

    // ---- OpenAiEmbedder against a fake endpoint ----

    #[derive(Clone)]
    struct Upstream {
        status: StatusCode,
        body: String,
        seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn handler(
        State(up): State<Upstream>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, String) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        up.seen.lock().unwrap().push((auth, body));
        (up.status, up.body.clone())
    }

    async fn spawn_upstream(status: StatusCode, body: &str) -> (String, Upstream) {
        let up = Upstream {
            status,
            body: body.to_string(),
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/v1/embeddings", post(handler))
            .with_state(up.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/v1", addr), up)
    }

    fn embedder(url: &str, key: Option<&str>) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            url,
            key.map(String::from),
            "text-embedding-3-small",
            3,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_openai_embedder_orders_by_index() {
        let body = r#"{"data":[{"index":1,"embedding":[0.0,1.0,0.0]},{"index":0,"embedding":[1.0,0.0,0.0]}]}"#;
        let (url, up) = spawn_upstream(StatusCode::OK, body).await;
        let out = embedder(&url, Some("sk-test"))
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);

        let seen = up.seen.lock().unwrap();
        assert_eq!(seen[0].0.as_deref(), Some("Bearer sk-test"));
        assert_eq!(seen[0].1["model"], "text-embedding-3-small");
        assert_eq!(seen[0].1["input"][1], "b");
    }

    #[tokio::test]
    async fn test_openai_embedder_error_status() {
        let (url, _up) = spawn_upstream(StatusCode::UNAUTHORIZED, "bad key").await;
        let err = embedder(&url, Some("sk-x"))
            .embed(&["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn test_openai_embedder_count_mismatch() {
        let (url, _up) = spawn_upstream(StatusCode::OK, r#"{"data":[]}"#).await;
        let err = embedder(&url, Some("sk-x"))
            .embed(&["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_openai_embedder_requires_key() {
        let err = embedder("http://127.0.0.1:9", None)
            .embed(&["a".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }

    #[tokio::test]
    async fn test_openai_embedder_empty_input_skips_request() {
        let out = embedder("http://127.0.0.1:9", None).embed(&[]).await.unwrap();
        assert!(out.is_empty());
    }
}
