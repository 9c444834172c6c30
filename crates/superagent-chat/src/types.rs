//! Request/response types for the chat pipeline and the model gateway.

use serde::{Deserialize, Serialize};
use superagent_core::config::ProviderConfig;

// =============================================================================
// Conversation
// =============================================================================

/// Read-only copy of a conversation record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub role: Option<String>,
    /// Formatted turns, oldest first.
    pub turns: Vec<String>,
}

/// One inbound chat message.
#[derive(Debug, Clone)]
pub struct ChatInput {
    pub tenant: String,
    pub user_id: String,
    pub message: String,
    pub image_url: Option<String>,
}

impl ChatInput {
    /// Tenant-scoped conversation key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.tenant, self.user_id)
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    /// Final text shown to the user.
    pub text: String,
    /// Whether the supervisor changed the draft.
    pub refined: bool,
    /// Role active for this turn.
    pub role: Option<String>,
    /// Retrieved snippets injected into the prompt.
    pub snippets_used: usize,
}

// =============================================================================
// Model messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Role-tagged message in OpenAI chat format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message with an attached image reference.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

/// Plain text or multi-part content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

// =============================================================================
// Model request
// =============================================================================

/// Sampling parameters; `None` fields are omitted from the wire request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl From<&ProviderConfig> for Sampling {
    fn from(cfg: &ProviderConfig) -> Self {
        Self {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            top_k: cfg.top_k,
            presence_penalty: cfg.presence_penalty,
            frequency_penalty: cfg.frequency_penalty,
            max_tokens: cfg.max_tokens,
        }
    }
}

/// Constrained output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    JsonObject,
}

/// Provider-independent completion request. The model id belongs to the
/// gateway that sends it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub sampling: Sampling,
    pub response_format: Option<ResponseFormat>,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>, sampling: Sampling) -> Self {
        Self {
            messages,
            sampling,
            response_format: None,
        }
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}
