//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use superagent_core::error::SuperagentError;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::handlers;
use crate::state::AppState;

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .cors_origins()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let mut headers = vec![header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];
    if let Ok(tenant_header) = HeaderName::from_bytes(state.config.auth.tenant_header.as_bytes()) {
        headers.push(tenant_header);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(headers)
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state);
    let body_limit = state.config.server.max_body_bytes;

    let public_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route("/status", get(handlers::status));

    let chat_routes = Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/stream", post(handlers::chat_stream))
        .route("/api/reset", post(handlers::reset))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::optional_tenant,
        ));

    let rag_routes = Router::new()
        .route("/rag/health", get(handlers::rag_health))
        .route("/rag/search", post(handlers::rag_search))
        .route("/rag/answer", post(handlers::rag_answer))
        .route("/rag/documents/upload", post(handlers::upload_document))
        .route("/rag/documents", get(handlers::list_documents))
        .route(
            "/rag/documents/{id}",
            get(handlers::get_document).delete(handlers::delete_document),
        )
        .route("/rag/documents/{id}/similar", get(handlers::similar_documents))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_tenant,
        ));

    public_routes
        .merge(chat_routes)
        .merge(rag_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address and serve until the process ends.
pub async fn start_server(state: AppState) -> Result<(), SuperagentError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SuperagentError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| SuperagentError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
