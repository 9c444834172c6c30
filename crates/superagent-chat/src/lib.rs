//! Conversational pipeline for SuperAgent.
//!
//! Holds per-user conversation memory, infers requested roles, assembles
//! model prompts, calls the chat-completion gateway and refines the draft
//! reply through a supervisor pass.

pub mod context;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod prompt;
pub mod refiner;
pub mod roles;
pub mod types;

#[cfg(test)]
mod test_support;

pub use context::ConversationStore;
pub use error::ChatError;
pub use gateway::{ChatModel, GatewayError, OpenAiCompatGateway};
pub use orchestrator::{ChatOrchestrator, SnippetSource};
pub use prompt::PromptAssembler;
pub use refiner::{strip_quotes, ResponseRefiner};
pub use roles::RoleInference;
pub use types::{
    ChatInput, ChatOutcome, ContentPart, ConversationSnapshot, Message, MessageContent,
    ModelRequest, ResponseFormat, Sampling,
};
