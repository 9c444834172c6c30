//! Prompt assembly for the draft model call.

use superagent_core::persona::Labels;
use superagent_core::types::{sort_by_score, RetrievedSnippet};

use crate::types::{ConversationSnapshot, Message, ModelRequest, Sampling};

/// Builds the `[system, user]` message pair for one turn.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_prompt: String,
    labels: &'static Labels,
    sampling: Sampling,
}

impl PromptAssembler {
    pub fn new(system_prompt: impl Into<String>, labels: &'static Labels, sampling: Sampling) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            labels,
            sampling,
        }
    }

    /// Assemble the model request for `message`.
    ///
    /// `context` is the conversation state read *before* the current user
    /// turn was stored, so the current message never appears twice.
    pub fn assemble(
        &self,
        context: &ConversationSnapshot,
        message: &str,
        snippets: &[RetrievedSnippet],
        image_url: Option<&str>,
    ) -> ModelRequest {
        let system = self.system_instruction(context.role.as_deref(), snippets);
        let user_text = self.user_text(&context.turns, message);

        let user = match image_url.filter(|url| !url.trim().is_empty()) {
            Some(url) => Message::user_with_image(user_text, url),
            None => Message::user(user_text),
        };

        ModelRequest::new(vec![Message::system(system), user], self.sampling.clone())
    }

    /// Base instruction plus the role directive and company context block.
    pub fn system_instruction(&self, role: Option<&str>, snippets: &[RetrievedSnippet]) -> String {
        let mut system = self.system_prompt.clone();

        if let Some(role) = role {
            system.push_str("\n\n");
            system.push_str(&self.labels.role_directive(role));
        }

        if !snippets.is_empty() {
            let mut ordered = snippets.to_vec();
            sort_by_score(&mut ordered);
            let block = ordered
                .iter()
                .enumerate()
                .map(|(i, s)| format!("[{}] {}", i + 1, s.content.trim()))
                .collect::<Vec<_>>()
                .join("\n\n");
            system.push_str(&format!(
                "\n\n{}:\n{}\n\n{}",
                self.labels.company_context, block, self.labels.company_context_usage
            ));
        }

        system
    }

    /// Current message, prefixed with the prior turns when there are any.
    pub fn user_text(&self, turns: &[String], message: &str) -> String {
        if turns.is_empty() {
            return message.to_string();
        }
        format!(
            "{}:\n{}\n\n{}:\n{}",
            self.labels.prior_context,
            turns.join("\n"),
            self.labels.current_question,
            message
        )
    }
}
