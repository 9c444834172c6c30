//! SuperAgent binary - composition root.
//!
//! 1. Load `.env`, the TOML configuration, environment overrides and flags
//! 2. Initialize tracing
//! 3. Build the model gateways and the chat pipeline
//! 4. Build the retrieval services when `[rag].enabled` is set
//! 5. Start the conversation sweeper and the axum API server

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use superagent_api::{start_server, AppState};
use superagent_chat::{ChatModel, ChatOrchestrator, OpenAiCompatGateway, Sampling};
use superagent_core::config::{SuperagentConfig, VectorBackend};
use superagent_rag::search::RetrievalSettings;
use superagent_rag::{
    Database, DocumentRegistry, DocumentService, DynEmbedder, HashEmbedder, MemoryVectorStore,
    OpenAiEmbedder, QdrantStore, RagService, VectorStore,
};

use crate::cli::CliArgs;

/// Retrieval services built from `[rag]`.
fn build_rag(config: &SuperagentConfig) -> Result<(Arc<RagService>, Arc<DocumentService>), Box<dyn std::error::Error>> {
    let rag = &config.rag;

    let embedder: Arc<dyn DynEmbedder> = if rag.embedding.api_key.is_some() {
        Arc::new(OpenAiEmbedder::from_config(&rag.embedding))
    } else {
        tracing::warn!("No embedding API key configured, using hash embeddings (development only)");
        Arc::new(HashEmbedder::new(rag.embedding.dimensions))
    };

    let store: Arc<dyn VectorStore> = match rag.backend {
        VectorBackend::Qdrant => Arc::new(QdrantStore::new(
            rag.qdrant_url.clone(),
            rag.qdrant_api_key.clone(),
            Duration::from_secs(30),
        )),
        VectorBackend::Memory => Arc::new(MemoryVectorStore::new()),
    };
    tracing::info!(backend = store.backend_name(), "Vector store ready");

    let db = Arc::new(Database::new(std::path::Path::new(&rag.database_path))?);

    let answer_model: Arc<dyn ChatModel> = Arc::new(OpenAiCompatGateway::from_config(&rag.answer));
    let search = RagService::new(
        Arc::clone(&embedder),
        Arc::clone(&store),
        answer_model,
        config.persona.labels(),
        RetrievalSettings::from(rag),
    )
    .with_answer_sampling(Sampling::from(&rag.answer));
    let documents = DocumentService::new(embedder, store, DocumentRegistry::new(db), rag);

    Ok((Arc::new(search), Arc::new(documents)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // A missing .env is normal outside development.
    let dotenv = dotenvy::dotenv();

    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(SuperagentConfig::load(&config_file))
    } else {
        None
    };
    let file_level = match loaded {
        Some(Ok(ref c)) => c.server.log_level.clone(),
        _ => "info".to_string(),
    };

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(args.resolve_log_filter(&file_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting SuperAgent v{}", env!("CARGO_PKG_VERSION"));
    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded .env");
    }

    // Config.
    let mut config = match loaded {
        Some(Ok(config)) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Some(Err(e)) => {
            tracing::error!(path = %config_file.display(), error = %e, "Invalid configuration file");
            return Err(e.into());
        }
        None => {
            tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
            SuperagentConfig::default()
        }
    };
    config.apply_env();
    args.apply(&mut config);
    config.validate()?;

    if config.model.api_key.is_none() {
        tracing::warn!("MODEL_API_KEY is not set; chat requests will receive the fallback reply");
    }

    // Chat pipeline.
    let model: Arc<dyn ChatModel> = Arc::new(OpenAiCompatGateway::from_config(&config.model));
    let supervisor: Arc<dyn ChatModel> = Arc::new(OpenAiCompatGateway::from_config(
        &config.supervisor.provider(&config.model),
    ));
    let mut chat = ChatOrchestrator::from_config(&config, model, supervisor)?;
    tracing::info!(
        model = %chat.model_name(),
        supervisor = config.supervisor.enabled,
        "Chat pipeline ready"
    );

    // Retrieval.
    let rag = if config.rag.enabled {
        let (search, documents) = build_rag(&config)?;
        chat = chat.with_snippet_source(search.clone());
        tracing::info!("Retrieval enabled");
        Some((search, documents))
    } else {
        tracing::info!("Retrieval disabled");
        None
    };

    // Background expiry of idle conversations.
    let sweep_every = Duration::from_secs(config.conversation.sweep_interval_secs.max(1));
    let _sweeper = Arc::clone(chat.store()).spawn_sweeper(sweep_every);

    let mut state = AppState::new(config, chat);
    if let Some((search, documents)) = rag {
        state = state.with_rag(search, documents);
    }

    if let Err(e) = start_server(state).await {
        tracing::error!(error = %e, "API server stopped");
        return Err(e.into());
    }

    Ok(())
}
