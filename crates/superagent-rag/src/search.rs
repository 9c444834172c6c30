//! Tenant-scoped semantic search and grounded answers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use superagent_chat::{ChatError, ChatModel, Message, ModelRequest, Sampling, SnippetSource};
use superagent_core::config::{ProviderConfig, RagConfig};
use superagent_core::persona::Labels;
use superagent_core::types::{sort_by_score, RetrievedSnippet};
use tracing::{debug, info};

use crate::embedding::{embed_one, DynEmbedder};
use crate::error::RagError;
use crate::vector::{ScoredPoint, VectorQuery, VectorStore};

/// Payload key holding the owning tenant.
pub const TENANT_KEY: &str = "tenantId";

/// Payload key holding the source document id.
pub const DOCUMENT_KEY: &str = "documentId";

/// Extra hits fetched by `find_similar` before grouping by document.
const SIMILAR_OVERFETCH: usize = 10;

// =============================================================================
// Requests and results
// =============================================================================

/// Semantic search parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
    /// Payload equality filters, ANDed with the tenant filter.
    #[serde(default)]
    pub filters: Map<String, Value>,
    /// Results containing any keyword are boosted and kept exclusively.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Grounded answer parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    #[serde(default)]
    pub question: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Answer with its sources and a 0-100 confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<RetrievedSnippet>,
    pub confidence: f32,
}

/// Retrieval knobs taken from `[rag]`.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub collection_prefix: String,
    pub score_threshold: f32,
    pub default_limit: usize,
    pub chat_limit: usize,
    pub keyword_boost: f32,
}

impl From<&RagConfig> for RetrievalSettings {
    fn from(cfg: &RagConfig) -> Self {
        Self {
            collection_prefix: cfg.collection_prefix.clone(),
            score_threshold: cfg.score_threshold,
            default_limit: cfg.default_limit,
            chat_limit: cfg.chat_limit,
            keyword_boost: cfg.keyword_boost,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

/// Collection name for a tenant. Characters outside `[A-Za-z0-9_-]` become
/// `_` so the name is always a valid path segment.
pub fn collection_name(prefix: &str, tenant: &str) -> String {
    let safe: String = tenant
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", prefix, safe)
}

fn point_to_snippet(point: ScoredPoint, tenant: &str) -> RetrievedSnippet {
    let mut payload = point.payload;
    let content = match payload.remove("content") {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let document_id = payload
        .get(DOCUMENT_KEY)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let chunk_index = payload
        .get("chunkIndex")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let file_name = payload
        .get("fileName")
        .and_then(Value::as_str)
        .map(String::from);
    let tenant_id = payload
        .get(TENANT_KEY)
        .and_then(Value::as_str)
        .unwrap_or(tenant)
        .to_string();

    RetrievedSnippet {
        content,
        document_id,
        chunk_index,
        score: point.score,
        tenant_id,
        file_name,
        metadata: payload,
    }
}

/// Keep results mentioning any keyword, boosted; all results otherwise.
pub fn apply_keyword_boost(
    results: Vec<RetrievedSnippet>,
    keywords: &[String],
    boost: f32,
) -> Vec<RetrievedSnippet> {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return results;
    }

    let mut matched: Vec<RetrievedSnippet> = results
        .iter()
        .filter(|r| {
            let content = r.content.to_lowercase();
            keywords.iter().any(|k| content.contains(k.as_str()))
        })
        .cloned()
        .map(|mut r| {
            r.score *= boost;
            r
        })
        .collect();

    if matched.is_empty() {
        return results;
    }
    sort_by_score(&mut matched);
    matched
}

// =============================================================================
// RagService
// =============================================================================

/// Search and answer over tenant collections.
pub struct RagService {
    embedder: Arc<dyn DynEmbedder>,
    store: Arc<dyn VectorStore>,
    answer_model: Arc<dyn ChatModel>,
    answer_sampling: Sampling,
    labels: &'static Labels,
    settings: RetrievalSettings,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn DynEmbedder>,
        store: Arc<dyn VectorStore>,
        answer_model: Arc<dyn ChatModel>,
        labels: &'static Labels,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            answer_model,
            answer_sampling: Sampling::from(&ProviderConfig::groq_answer()),
            labels,
            settings,
        }
    }

    /// Sampling defaults for `answer`, usually from `[rag.answer]`.
    pub fn with_answer_sampling(mut self, sampling: Sampling) -> Self {
        self.answer_sampling = sampling;
        self
    }

    pub fn collection_for(&self, tenant: &str) -> String {
        collection_name(&self.settings.collection_prefix, tenant)
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// Tenant-scoped semantic search, most similar first.
    ///
    /// A blank query or a tenant without a collection yields no results.
    pub async fn search(&self, tenant: &str, request: &SearchRequest) -> Result<Vec<RetrievedSnippet>, RagError> {
        if request.query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = embed_one(self.embedder.as_ref(), &request.query).await?;

        let mut must = vec![(TENANT_KEY.to_string(), Value::String(tenant.to_string()))];
        must.extend(
            request
                .filters
                .iter()
                .filter(|(k, _)| k.as_str() != TENANT_KEY)
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let query = VectorQuery {
            vector,
            limit: request.limit.unwrap_or(self.settings.default_limit).max(1),
            score_threshold: Some(self.settings.score_threshold),
            must,
            must_not: Vec::new(),
        };

        let collection = self.collection_for(tenant);
        let hits = self.store.search(&collection, &query).await?;

        let mut results: Vec<RetrievedSnippet> = hits
            .into_iter()
            .map(|hit| point_to_snippet(hit, tenant))
            .collect();
        sort_by_score(&mut results);

        let results = apply_keyword_boost(results, &request.keywords, self.settings.keyword_boost);
        debug!(tenant = %tenant, collection = %collection, results = results.len(), "Search completed");
        Ok(results)
    }

    /// Other documents of the tenant that resemble `document_id`.
    ///
    /// One of the document's own chunk vectors is the query. Each document
    /// is represented by its best-scoring chunk. An unknown document yields
    /// no results.
    pub async fn find_similar(
        &self,
        tenant: &str,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedSnippet>, RagError> {
        let collection = self.collection_for(tenant);
        let tenant_filter = (TENANT_KEY.to_string(), Value::String(tenant.to_string()));
        let document_filter = (DOCUMENT_KEY.to_string(), Value::String(document_id.to_string()));

        let reference = self
            .store
            .first_vector(&collection, &[tenant_filter.clone(), document_filter.clone()])
            .await?;
        let Some(vector) = reference else {
            return Ok(Vec::new());
        };

        let limit = limit.max(1);
        let query = VectorQuery {
            vector,
            limit: limit + SIMILAR_OVERFETCH,
            score_threshold: None,
            must: vec![tenant_filter],
            must_not: vec![document_filter],
        };
        let hits = self.store.search(&collection, &query).await?;

        let mut best: HashMap<String, RetrievedSnippet> = HashMap::new();
        for snippet in hits.into_iter().map(|hit| point_to_snippet(hit, tenant)) {
            if snippet.document_id.is_empty() {
                continue;
            }
            let keep = best
                .get(&snippet.document_id)
                .map_or(true, |current| snippet.score > current.score);
            if keep {
                best.insert(snippet.document_id.clone(), snippet);
            }
        }

        let mut results: Vec<RetrievedSnippet> = best.into_values().collect();
        sort_by_score(&mut results);
        results.truncate(limit);
        debug!(tenant = %tenant, document_id = %document_id, results = results.len(), "Similar documents found");
        Ok(results)
    }

    /// Answer `request.question` from the tenant's documents.
    ///
    /// Without relevant snippets the fixed no-information reply is returned
    /// with confidence 0 and no model call.
    pub async fn answer(&self, tenant: &str, request: &AnswerRequest) -> Result<Answer, RagError> {
        let sources = self
            .search(
                tenant,
                &SearchRequest {
                    query: request.question.clone(),
                    limit: Some(self.settings.default_limit),
                    ..SearchRequest::default()
                },
            )
            .await?;

        if sources.is_empty() {
            return Ok(Answer {
                answer: self.labels.rag_no_information.to_string(),
                sources,
                confidence: 0.0,
            });
        }

        let prompt = self.answer_prompt(&request.question, &sources);
        let system = request
            .system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(self.labels.rag_system_prompt);

        let mut sampling = self.answer_sampling.clone();
        if let Some(t) = request.temperature {
            sampling.temperature = t;
        }
        if let Some(m) = request.max_tokens {
            sampling.max_tokens = Some(m);
        }

        let model_request = ModelRequest::new(vec![Message::system(system), Message::user(prompt)], sampling);
        let text = self.answer_model.complete(&model_request).await?;

        let confidence = confidence(&sources);
        info!(tenant = %tenant, sources = sources.len(), confidence, "Answer generated");

        Ok(Answer {
            answer: text.trim().to_string(),
            sources,
            confidence,
        })
    }

    /// Numbered context, question and instructions.
    pub fn answer_prompt(&self, question: &str, sources: &[RetrievedSnippet]) -> String {
        let l = self.labels;
        let context = sources
            .iter()
            .enumerate()
            .map(|(i, s)| format!("[{}] {}", i + 1, s.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "{}:\n{}\n\n{}: {}\n\n{}:\n{}\n\n{}:",
            l.rag_context,
            context,
            l.rag_question,
            question,
            l.rag_instructions,
            l.rag_instructions_body,
            l.rag_answer
        )
    }
}

/// Mean score scaled to a percentage, capped at 100.
pub fn confidence(sources: &[RetrievedSnippet]) -> f32 {
    if sources.is_empty() {
        return 0.0;
    }
    let avg = sources.iter().map(|s| s.score).sum::<f32>() / sources.len() as f32;
    (avg * 100.0).min(100.0)
}

#[async_trait]
impl SnippetSource for RagService {
    async fn snippets(&self, tenant: &str, query: &str) -> Result<Vec<RetrievedSnippet>, ChatError> {
        let request = SearchRequest {
            query: query.to_string(),
            limit: Some(self.settings.chat_limit),
            ..SearchRequest::default()
        };
        Ok(self.search(tenant, &request).await?)
    }
}
