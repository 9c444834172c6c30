//! Language presets for the assistant persona.
//!
//! Everything the pipeline writes into prompts or conversation history
//! (turn prefixes, block labels, canned replies) comes from one [`Labels`]
//! table selected by [`Language`]. Prompt bodies can still be overridden
//! through `[persona]` in the config file.

use serde::{Deserialize, Serialize};

/// Conversation language; selects the [`Labels`] preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    pub fn labels(self) -> &'static Labels {
        match self {
            Language::Es => &SPANISH,
            Language::En => &ENGLISH,
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "es" | "spanish" | "español" => Ok(Language::Es),
            "en" | "english" => Ok(Language::En),
            other => Err(format!("unsupported language '{}'", other)),
        }
    }
}

/// Fixed strings for one language.
#[derive(Debug)]
pub struct Labels {
    pub user_turn: &'static str,
    pub assistant_turn: &'static str,
    pub prior_context: &'static str,
    pub current_question: &'static str,
    pub current_role: &'static str,
    pub role_directive_prefix: &'static str,
    pub role_directive_suffix: &'static str,
    pub company_context: &'static str,
    pub company_context_usage: &'static str,
    pub system_prompt: &'static str,
    pub supervisor_prompt: &'static str,
    pub supervisor_user_message: &'static str,
    pub supervisor_draft: &'static str,
    pub supervisor_role: &'static str,
    pub supervisor_history: &'static str,
    pub supervisor_request: &'static str,
    pub supervisor_json_request: &'static str,
    pub fallback_reply: &'static str,
    pub liveness: &'static str,
    pub conversation_reset: &'static str,
    pub rag_system_prompt: &'static str,
    pub rag_context: &'static str,
    pub rag_question: &'static str,
    pub rag_instructions: &'static str,
    pub rag_instructions_body: &'static str,
    pub rag_answer: &'static str,
    pub rag_no_information: &'static str,
}

impl Labels {
    /// Line appended to the system prompt while a role is active.
    pub fn role_directive(&self, role: &str) -> String {
        format!(
            "{}{}{}",
            self.role_directive_prefix, role, self.role_directive_suffix
        )
    }
}

static SPANISH: Labels = Labels {
    user_turn: "Usuario",
    assistant_turn: "Asistente",
    prior_context: "CONTEXTO PREVIO",
    current_question: "PREGUNTA ACTUAL",
    current_role: "ROL ACTUAL",
    role_directive_prefix: "ROL ACTUAL: Eres un ",
    role_directive_suffix: ". Mantén este rol durante toda la conversación.",
    company_context: "INFORMACIÓN IMPORTANTE DE LA EMPRESA",
    company_context_usage: "Usa esta información cuando sea relevante para responder a las preguntas del \
        cliente.",
    system_prompt: "Eres SuperAgent, un asistente conversacional. Responde en español, \
        con frases cortas y naturales, como lo haría una persona real. Si el usuario te pide \
        adoptar un rol, mantenlo hasta que la conversación termine. No menciones que eres un \
        modelo de lenguaje.",
    supervisor_prompt: "Eres el supervisor de calidad de SuperAgent. Recibes la respuesta \
        que el asistente preparó para un usuario. Corrige el tono, acorta lo que sobre y \
        asegura que sea coherente con la conversación y con el rol activo. Si la respuesta ya \
        es adecuada, devuélvela sin cambios. Devuelve solo el texto final para el usuario, sin \
        análisis ni comentarios.",
    supervisor_user_message: "Mensaje del usuario",
    supervisor_draft: "Respuesta generada",
    supervisor_role: "ROL ACTUAL DEL ASISTENTE",
    supervisor_history: "CONTEXTO DE LA CONVERSACIÓN",
    supervisor_request: "Revisa esta respuesta según tus criterios de supervisión.",
    supervisor_json_request: "Responde únicamente con un objeto JSON con el campo",
    fallback_reply: "Lo siento, tuve un problema al procesar tu mensaje. ¿Puedes intentarlo \
        de nuevo en un momento?",
    liveness: "SuperAgent API en funcionamiento: memoria contextual, roles y supervisión activos",
    conversation_reset: "Conversación reiniciada.",
    rag_system_prompt: "Eres un asistente que responde preguntas usando solo la información \
        proporcionada de la empresa.",
    rag_context: "Contexto",
    rag_question: "Pregunta",
    rag_instructions: "Instrucciones",
    rag_instructions_body: "Responde usando solo el contexto anterior. Si el contexto no \
        alcanza para responder, dilo claramente. Cita los fragmentos con su número entre \
        corchetes cuando sea útil.",
    rag_answer: "Respuesta",
    rag_no_information: "Lo siento, no encontré información relevante para responder tu pregunta.",
};

static ENGLISH: Labels = Labels {
    user_turn: "User",
    assistant_turn: "Assistant",
    prior_context: "PRIOR CONTEXT",
    current_question: "CURRENT QUESTION",
    current_role: "CURRENT ROLE",
    role_directive_prefix: "CURRENT ROLE: You are a ",
    role_directive_suffix: ". Keep this role for the whole conversation.",
    company_context: "IMPORTANT COMPANY INFORMATION",
    company_context_usage: "Use this information when it is relevant to the customer's question.",
    system_prompt: "You are SuperAgent, a conversational assistant. Answer in short, natural \
        sentences, the way a real person would. If the user asks you to take on a role, keep \
        it until the conversation ends. Do not mention that you are a language model.",
    supervisor_prompt: "You are SuperAgent's quality supervisor. You receive the reply the \
        assistant drafted for a user. Fix the tone, trim anything unnecessary and keep it \
        consistent with the conversation and the active role. If the reply is already fine, \
        return it unchanged. Return only the final text for the user, with no analysis or \
        commentary.",
    supervisor_user_message: "User message",
    supervisor_draft: "Generated reply",
    supervisor_role: "ASSISTANT'S CURRENT ROLE",
    supervisor_history: "CONVERSATION CONTEXT",
    supervisor_request: "Review this reply against your supervision criteria.",
    supervisor_json_request: "Reply only with a JSON object holding the field",
    fallback_reply: "Sorry, I had trouble processing your message. Could you try again in a \
        moment?",
    liveness: "SuperAgent API is running: contextual memory, roles and supervision enabled",
    conversation_reset: "Conversation reset.",
    rag_system_prompt: "You are an assistant that answers questions using only the company \
        information provided.",
    rag_context: "Context",
    rag_question: "Question",
    rag_instructions: "Instructions",
    rag_instructions_body: "Answer using only the context above. If the context is not \
        enough to answer, say so plainly. Cite fragments by their bracketed number when useful.",
    rag_answer: "Answer",
    rag_no_information: "Sorry, I couldn't find relevant information to answer your question.",
};
