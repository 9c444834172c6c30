//! One chat turn, end to end: memory, prompt, draft, supervisor.

use std::sync::Arc;

use async_trait::async_trait;
use superagent_core::config::SuperagentConfig;
use superagent_core::types::RetrievedSnippet;
use tracing::{debug, error, info, warn};

use crate::context::ConversationStore;
use crate::error::ChatError;
use crate::gateway::ChatModel;
use crate::prompt::PromptAssembler;
use crate::refiner::{strip_quotes, ResponseRefiner};
use crate::roles::RoleInference;
use crate::types::{ChatInput, ChatOutcome, ConversationSnapshot, Sampling};

/// Source of company context for the draft prompt.
#[async_trait]
pub trait SnippetSource: Send + Sync {
    /// Snippets relevant to `query` within `tenant`, most relevant first.
    async fn snippets(&self, tenant: &str, query: &str) -> Result<Vec<RetrievedSnippet>, ChatError>;
}

/// Runs the draft-then-refine pipeline against the conversation store.
pub struct ChatOrchestrator {
    store: Arc<ConversationStore>,
    assembler: PromptAssembler,
    model: Arc<dyn ChatModel>,
    refiner: Option<ResponseRefiner>,
    snippets: Option<Arc<dyn SnippetSource>>,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<ConversationStore>,
        assembler: PromptAssembler,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            store,
            assembler,
            model,
            refiner: None,
            snippets: None,
        }
    }

    /// Pipeline wired from configuration.
    ///
    /// `supervisor` is used only when `[supervisor].enabled` is set.
    pub fn from_config(
        config: &SuperagentConfig,
        model: Arc<dyn ChatModel>,
        supervisor: Arc<dyn ChatModel>,
    ) -> Result<Self, ChatError> {
        let labels = config.persona.labels();
        let roles = RoleInference::from_config(&config.roles)?;
        let store = Arc::new(ConversationStore::new(&config.conversation, labels, roles));
        let assembler = PromptAssembler::new(
            config.persona.system_prompt(),
            labels,
            Sampling::from(&config.model),
        );

        let orchestrator = Self::new(store, assembler, model);
        if !config.supervisor.enabled {
            return Ok(orchestrator);
        }
        Ok(orchestrator.with_refiner(ResponseRefiner::from_config(
            supervisor,
            &config.supervisor,
            &config.persona,
            &config.model,
        )))
    }

    pub fn with_refiner(mut self, refiner: ResponseRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn with_snippet_source(mut self, source: Arc<dyn SnippetSource>) -> Self {
        self.snippets = Some(source);
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Process one user message.
    ///
    /// Turns for the same conversation key are serialized. The user turn is
    /// stored before the model call, so it survives a gateway failure; the
    /// error is returned for the caller to present.
    pub async fn handle(&self, input: &ChatInput) -> Result<ChatOutcome, ChatError> {
        let key = input.key();
        let lock = self.store.turn_lock(&key);
        let _guard = lock.lock().await;

        let before = self.store.get_context(&key);
        let role = self.store.add_message(&key, &input.message, true);
        let context = ConversationSnapshot {
            role: role.clone(),
            turns: before.turns,
        };

        let snippets = self.fetch_snippets(&input.tenant, &input.message).await;
        let request = self.assembler.assemble(
            &context,
            &input.message,
            &snippets,
            input.image_url.as_deref(),
        );

        let draft = match self.model.complete(&request).await {
            Ok(text) => strip_quotes(&text),
            Err(e) => {
                error!(user = %key, error = %e, "Draft generation failed");
                return Err(e.into());
            }
        };
        self.store.add_message(&key, &draft, false);

        let text = match self.refiner {
            Some(ref refiner) => {
                let current = self.store.get_context(&key);
                let refined = refiner.refine(&draft, &input.message, &current).await;
                if refined != draft {
                    self.store.replace_last_assistant_turn(&key, &refined);
                }
                refined
            }
            None => draft.clone(),
        };

        let refined = text != draft;
        info!(
            user = %key,
            role = role.as_deref().unwrap_or("-"),
            snippets = snippets.len(),
            refined,
            "Chat turn completed"
        );

        Ok(ChatOutcome {
            text,
            refined,
            role,
            snippets_used: snippets.len(),
        })
    }

    /// Forget the conversation of `user_id` within `tenant`.
    pub fn reset(&self, tenant: &str, user_id: &str) -> bool {
        self.store.reset_user(&format!("{}:{}", tenant, user_id))
    }

    async fn fetch_snippets(&self, tenant: &str, query: &str) -> Vec<RetrievedSnippet> {
        let Some(ref source) = self.snippets else {
            return Vec::new();
        };
        if query.trim().is_empty() {
            return Vec::new();
        }
        match source.snippets(tenant, query).await {
            Ok(found) => {
                debug!(tenant = %tenant, count = found.len(), "Company context retrieved");
                found
            }
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Retrieval failed, answering without context");
                Vec::new()
            }
        }
    }
}
