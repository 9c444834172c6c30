//! Route handler functions for all API endpoints.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use superagent_chat::ChatInput;
use superagent_core::config::StreamingConfig;
use superagent_core::types::{DocumentRecord, RetrievedSnippet};
use superagent_rag::{Answer, AnswerRequest, SearchRequest, Upload};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::auth::Tenant;
use crate::error::ApiError;
use crate::state::{AppState, RagServices};

const DEFAULT_USER: &str = "default";

// =============================================================================
// Request types
// =============================================================================

/// String field of a JSON body; null and non-string values count as absent.
fn string_field(body: &Value, name: &str) -> Option<String> {
    body.get(name).and_then(Value::as_str).map(String::from)
}

/// JSON body, or `Null` when it is missing or not JSON.
fn lenient_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

/// Body of `/api/chat` and `/api/chat/stream`. Missing fields default.
#[derive(Debug, Default)]
pub struct ChatRequest {
    pub message: String,
    pub image_url: Option<String>,
    pub user_id: Option<String>,
}

impl ChatRequest {
    /// Read `{message, imageUrl, userId}` from any body without rejecting it.
    pub fn from_body(bytes: &[u8]) -> Self {
        let body = lenient_json(bytes);
        Self {
            message: string_field(&body, "message").unwrap_or_default(),
            image_url: string_field(&body, "imageUrl"),
            user_id: string_field(&body, "userId"),
        }
    }

    fn into_input(self, tenant: String) -> ChatInput {
        let user_id = self
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER.to_string());
        ChatInput {
            tenant,
            user_id,
            message: self.message,
            image_url: self.image_url,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResetRequest {
    pub user_id: Option<String>,
}

impl ResetRequest {
    pub fn from_body(bytes: &[u8]) -> Self {
        Self {
            user_id: string_field(&lenient_json(bytes), "userId"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub limit: Option<usize>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub model: String,
    pub features: Vec<String>,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub text: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RetrievedSnippet>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: Answer,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub id: Uuid,
    pub file_name: String,
    pub chunks_created: u32,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document: UploadedDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub document: DocumentRecord,
}

// =============================================================================
// Service probes
// =============================================================================

/// GET / - plaintext liveness string.
pub async fn root(State(state): State<AppState>) -> &'static str {
    state.config.persona.labels().liveness
}

/// GET /api/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /status - model and feature summary.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let persona = &state.config.persona;
    Json(StatusResponse {
        status: "online".to_string(),
        model: persona.model_label.clone(),
        features: persona.features.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}

// =============================================================================
// Chat
// =============================================================================

/// POST /api/chat - one refined reply.
///
/// A model failure is answered with the persona's apology and status 200.
pub async fn chat(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    body: Bytes,
) -> Json<ChatResponse> {
    let input = ChatRequest::from_body(&body).into_input(tenant);
    let text = match state.chat.handle(&input).await {
        Ok(outcome) => outcome.text,
        Err(e) => {
            tracing::warn!(user = %input.key(), error = %e, "Chat failed, sending fallback reply");
            state.config.persona.fallback_reply().to_string()
        }
    };

    Json(ChatResponse {
        text,
        is_user: false,
        timestamp: Utc::now(),
    })
}

/// Simulated typing time for a reply of `text`.
pub fn typing_delay(cfg: &StreamingConfig, text: &str) -> Duration {
    let chars = text.chars().count() as u64;
    let ms = chars
        .saturating_mul(cfg.ms_per_char)
        .clamp(cfg.min_delay_ms, cfg.max_delay_ms.max(cfg.min_delay_ms));
    Duration::from_millis(ms)
}

fn sse_event(payload: Value) -> Event {
    Event::default().data(payload.to_string())
}

/// POST /api/chat/stream - SSE with `start`, one `chunk`, then `done`.
///
/// Errors are sent as an `error` event before the stream closes. A client
/// that disconnects simply stops receiving; the turn still completes.
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    body: Bytes,
) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel::<Value>(4);
    let input = ChatRequest::from_body(&body).into_input(tenant);

    tokio::spawn(async move {
        if tx.send(json!({"start": true})).await.is_err() {
            return;
        }

        match state.chat.handle(&input).await {
            Ok(outcome) => {
                tokio::time::sleep(typing_delay(&state.config.streaming, &outcome.text)).await;
                if tx.send(json!({"chunk": outcome.text})).await.is_err() {
                    tracing::debug!(user = %input.key(), "Stream client went away");
                    return;
                }
                let _ = tx.send(json!({"done": true})).await;
            }
            Err(e) => {
                tracing::warn!(user = %input.key(), error = %e, "Streamed chat failed");
                let _ = tx.send(json!({"error": e.to_string()})).await;
            }
        }
    });

    (
        [
            (HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no")),
            (axum::http::header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        sse(rx),
    )
}

fn sse(rx: mpsc::Receiver<Value>) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let stream = ReceiverStream::new(rx).map(|payload| Ok::<_, Infallible>(sse_event(payload)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// POST /api/reset - forget a user's conversation.
pub async fn reset(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    body: Bytes,
) -> Json<ResetResponse> {
    let user_id = ResetRequest::from_body(&body)
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER.to_string());
    let existed = state.chat.reset(&tenant, &user_id);
    tracing::info!(tenant = %tenant, user_id = %user_id, existed, "Conversation reset");

    Json(ResetResponse {
        success: true,
        message: state.config.persona.labels().conversation_reset.to_string(),
    })
}

// =============================================================================
// Retrieval
// =============================================================================

fn rag(state: &AppState) -> Result<&RagServices, ApiError> {
    state
        .rag
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("RAG is disabled".to_string()))
}

/// GET /rag/health
pub async fn rag_health(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
) -> Result<Json<Value>, ApiError> {
    let services = rag(&state)?;
    Ok(Json(json!({
        "status": "ok",
        "service": "rag",
        "backend": services.search.backend_name(),
        "tenantId": tenant,
    })))
}

/// POST /rag/search
pub async fn rag_search(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = rag(&state)?.search.search(&tenant, &body).await?;
    Ok(Json(SearchResponse { results }))
}

/// POST /rag/answer
pub async fn rag_answer(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    Json(body): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    if body.question.trim().is_empty() {
        return Err(ApiError::BadRequest("'question' must not be empty".to_string()));
    }
    let answer = rag(&state)?.search.answer(&tenant, &body).await?;
    Ok(Json(AnswerResponse { answer }))
}

/// POST /rag/documents/upload - multipart `file` plus optional `metadata` JSON.
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let services = rag(&state)?;

    let mut upload: Option<Upload> = None;
    let mut metadata = Map::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.txt").to_string();
                let content_type = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                upload = Some(Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                    metadata: Map::new(),
                });
            }
            "metadata" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                if !text.trim().is_empty() {
                    metadata = match serde_json::from_str::<Value>(&text) {
                        Ok(Value::Object(map)) => map,
                        _ => {
                            return Err(ApiError::BadRequest(
                                "'metadata' must be a JSON object".to_string(),
                            ))
                        }
                    };
                }
            }
            _ => {}
        }
    }

    let mut upload = upload.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    upload.metadata = metadata;

    let doc = services.documents.upload(&tenant, upload).await?;
    Ok(Json(UploadResponse {
        document: UploadedDocument {
            id: doc.id,
            file_name: doc.file_name,
            chunks_created: doc.chunk_count,
        },
    }))
}

/// GET /rag/documents?page&limit
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    Query(params): Query<ListParams>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let page = rag(&state)?.documents.list(
        &tenant,
        params.page.unwrap_or(1),
        params.limit.unwrap_or(20),
    )?;
    Ok(Json(DocumentListResponse {
        documents: page.documents,
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages,
        },
    }))
}

fn parse_document_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::NotFound(format!("document {} not found", id)))
}

/// GET /rag/documents/{id}
pub async fn get_document(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let id = parse_document_id(&id)?;
    let document = rag(&state)?.documents.get(&tenant, id)?;
    Ok(Json(DocumentResponse { document }))
}

/// GET /rag/documents/{id}/similar?limit
pub async fn similar_documents(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    Path(id): Path<String>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let id = parse_document_id(&id)?;
    let services = rag(&state)?;
    services.documents.get(&tenant, id)?;
    let results = services
        .search
        .find_similar(&tenant, &id.to_string(), params.limit.unwrap_or(5))
        .await?;
    Ok(Json(SearchResponse { results }))
}

/// DELETE /rag/documents/{id}
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_document_id(&id)?;
    rag(&state)?.documents.delete(&tenant, id).await?;
    Ok(Json(json!({"success": true})))
}
