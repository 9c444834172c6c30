//! Supervisor pass over the draft reply.
//!
//! A second model call reviews the draft for tone, brevity and continuity.
//! The supervisor is asked for a JSON object with a single answer field; when
//! it ignores that and answers in prose, the final text is recovered with
//! marker and paragraph heuristics. Refinement is best-effort: any failure
//! yields the quote-stripped draft.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use superagent_core::config::{PersonaConfig, ProviderConfig, SupervisorConfig};
use superagent_core::persona::Labels;
use tracing::{debug, warn};

use crate::gateway::ChatModel;
use crate::types::{ConversationSnapshot, Message, ModelRequest, ResponseFormat, Sampling};

// =============================================================================
// Quote stripping
// =============================================================================

const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('\u{201C}', '\u{201D}'),
    ('\u{2018}', '\u{2019}'),
    ('\u{00AB}', '\u{00BB}'),
];

/// Trim the text and remove enclosing matching quote pairs.
///
/// Repeats until no enclosing pair remains, so applying it twice gives the
/// same result as applying it once. Unmatched quotes are left alone.
pub fn strip_quotes(text: &str) -> String {
    let mut current = text.trim();
    loop {
        let mut chars = current.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            break;
        };
        let matched = QUOTE_PAIRS
            .iter()
            .any(|&(open, close)| first == open && last == close);
        if !matched {
            break;
        }
        current = current[first.len_utf8()..current.len() - last.len_utf8()].trim();
    }
    current.to_string()
}

// =============================================================================
// Heuristic extraction
// =============================================================================

/// Phrases that show the supervisor commented on the draft instead of
/// rewriting it. Matched case-sensitively, like the final markers.
const ANALYSIS_PHRASES: &[&str] = &[
    "La respuesta generada es",
    "La respuesta corregida es",
    "La respuesta es ",
    "Una versión revisada",
    "Una versión mejorada",
    "Versión corregida",
    "Sin embargo,",
    "Esta versión",
    "The generated response is",
    "The corrected response is",
    "The response is ",
    "A revised version",
    "An improved version",
    "Corrected version",
    "However,",
    "This version",
];

/// Labels that introduce the final answer inside an analysis.
const FINAL_MARKERS: &[&str] = &[
    "La respuesta corregida es:",
    "Respuesta corregida:",
    "Respuesta final:",
    "Versión final:",
    "The corrected response is:",
    "Corrected response:",
    "Corrected version:",
    "Final answer:",
    "Final version:",
];

fn alternation(phrases: &[&str]) -> String {
    let escaped: Vec<String> = phrases.iter().map(|p| regex::escape(p)).collect();
    format!("(?:{})", escaped.join("|"))
}

static ANALYSIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&alternation(ANALYSIS_PHRASES)).expect("Invalid analysis phrase regex")
});

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&alternation(FINAL_MARKERS)).expect("Invalid final marker regex")
});

/// Recover the user-facing answer from free-form supervisor output.
///
/// Text after the last final-answer marker wins. Without a marker, output
/// that reads as analysis falls back to its last paragraph when that
/// paragraph is not analysis itself. Otherwise the whole output is kept.
pub fn extract_final_answer(raw: &str) -> String {
    if let Some(marker) = MARKER_RE.find_iter(raw).last() {
        let tail = strip_quotes(&raw[marker.end()..]);
        if !tail.is_empty() {
            return tail;
        }
    }

    if ANALYSIS_RE.is_match(raw) {
        if let Some(last) = raw.rsplit("\n\n").next() {
            let last = last.trim();
            if raw.contains("\n\n") && !last.is_empty() && !ANALYSIS_RE.is_match(last) {
                return strip_quotes(last);
            }
        }
    }

    strip_quotes(raw)
}

/// Read `field` from a JSON object reply, tolerating code fences and
/// surrounding prose.
fn parse_structured(raw: &str, field: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&raw[start..=end]).ok()?;
    value.get(field)?.as_str().map(str::to_string)
}

// =============================================================================
// ResponseRefiner
// =============================================================================

/// Second-pass supervisor over the draft reply.
pub struct ResponseRefiner {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    labels: &'static Labels,
    sampling: Sampling,
    answer_field: Option<String>,
    json_response_format: bool,
}

impl ResponseRefiner {
    /// Free-text supervisor with the given persona and sampling.
    pub fn new(
        model: Arc<dyn ChatModel>,
        system_prompt: impl Into<String>,
        labels: &'static Labels,
        sampling: Sampling,
    ) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            labels,
            sampling,
            answer_field: None,
            json_response_format: false,
        }
    }

    pub fn from_config(
        model: Arc<dyn ChatModel>,
        supervisor: &SupervisorConfig,
        persona: &PersonaConfig,
        primary: &ProviderConfig,
    ) -> Self {
        let provider = supervisor.provider(primary);
        let mut refiner = Self::new(
            model,
            persona.supervisor_prompt(),
            persona.labels(),
            Sampling::from(&provider),
        );
        if supervisor.structured_output {
            refiner = refiner.with_structured_output(supervisor.answer_field.clone());
        }
        refiner.json_response_format = supervisor.json_response_format;
        refiner
    }

    /// Ask for `{"<field>": "..."}` and read the answer from that field.
    pub fn with_structured_output(mut self, field: impl Into<String>) -> Self {
        self.answer_field = Some(field.into());
        self
    }

    /// Also request JSON mode from the provider.
    pub fn with_json_response_format(mut self, enabled: bool) -> Self {
        self.json_response_format = enabled;
        self
    }

    /// The supervisor request for `draft`.
    pub fn build_request(
        &self,
        draft: &str,
        user_message: &str,
        context: &ConversationSnapshot,
    ) -> ModelRequest {
        let l = self.labels;
        let mut system = self.system_prompt.clone();
        if let Some(ref field) = self.answer_field {
            system.push_str(&format!(
                "\n\n{} \"{}\".",
                l.supervisor_json_request, field
            ));
        }

        let mut prompt = format!(
            "{}: \"{}\"\n\n{}: \"{}\"",
            l.supervisor_user_message, user_message, l.supervisor_draft, draft
        );
        if let Some(ref role) = context.role {
            prompt.push_str(&format!("\n\n{}: {}", l.supervisor_role, role));
        }
        if !context.turns.is_empty() {
            prompt.push_str(&format!(
                "\n\n{}:\n{}",
                l.supervisor_history,
                context.turns.join("\n")
            ));
        }
        prompt.push_str("\n\n");
        prompt.push_str(l.supervisor_request);

        let request = ModelRequest::new(
            vec![Message::system(system), Message::user(prompt)],
            self.sampling.clone(),
        );
        if self.answer_field.is_some() && self.json_response_format {
            request.with_response_format(ResponseFormat::JsonObject)
        } else {
            request
        }
    }

    /// Final answer from raw supervisor output.
    pub fn extract(&self, raw: &str) -> String {
        if let Some(ref field) = self.answer_field {
            if let Some(answer) = parse_structured(raw, field) {
                return strip_quotes(&answer);
            }
            debug!("Supervisor ignored the JSON format, using text extraction");
        }
        extract_final_answer(raw)
    }

    /// Review `draft`. Never fails: errors and empty results fall back to
    /// the quote-stripped draft.
    pub async fn refine(
        &self,
        draft: &str,
        user_message: &str,
        context: &ConversationSnapshot,
    ) -> String {
        let request = self.build_request(draft, user_message, context);
        match self.model.complete(&request).await {
            Ok(raw) => {
                let refined = self.extract(&raw);
                if refined.is_empty() {
                    strip_quotes(draft)
                } else {
                    refined
                }
            }
            Err(e) => {
                warn!(error = %e, "Supervisor call failed, keeping draft");
                strip_quotes(draft)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::test_support::ScriptedModel;
    use superagent_core::persona::Language;

    fn refiner(model: Arc<ScriptedModel>) -> ResponseRefiner {
        ResponseRefiner::new(
            model,
            "Eres el supervisor.",
            Language::Es.labels(),
            Sampling {
                temperature: 0.3,
                ..Sampling::default()
            },
        )
    }

    // ---- Quote stripping ----

    #[test]
    fn test_strip_quotes_pairs() {
        assert_eq!(strip_quotes("\"hola\""), "hola");
        assert_eq!(strip_quotes("'hola'"), "hola");
        assert_eq!(strip_quotes("\u{201C}hola\u{201D}"), "hola");
        assert_eq!(strip_quotes("\u{2018}hola\u{2019}"), "hola");
        assert_eq!(strip_quotes("«hola»"), "hola");
    }

    #[test]
    fn test_strip_quotes_trims_first() {
        assert_eq!(strip_quotes("  \"hola\"\n"), "hola");
    }

    #[test]
    fn test_strip_quotes_unmatched_untouched() {
        assert_eq!(strip_quotes("'hola"), "'hola");
        assert_eq!(strip_quotes("\"hola'"), "\"hola'");
        assert_eq!(strip_quotes("l'eau"), "l'eau");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn test_strip_quotes_idempotent() {
        for input in ["\"\"doble\"\"", "' \"mixto\" '", "sin comillas", "\"\"", ""] {
            let once = strip_quotes(input);
            assert_eq!(strip_quotes(&once), once, "input: {:?}", input);
        }
        assert_eq!(strip_quotes("\"\"doble\"\""), "doble");
    }

    // ---- Heuristic extraction ----

    #[test]
    fn test_final_marker() {
        assert_eq!(extract_final_answer("Final answer: X"), "X");
        assert_eq!(
            extract_final_answer("La respuesta es buena. Sin embargo, falta calidez.\n\nRespuesta final: \"¡Claro! Te ayudo.\""),
            "¡Claro! Te ayudo."
        );
    }

    #[test]
    fn test_last_marker_wins() {
        let raw = "Respuesta corregida: primera\n\nVersión final: segunda";
        assert_eq!(extract_final_answer(raw), "segunda");
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        assert_eq!(extract_final_answer("FINAL ANSWER: ok"), "FINAL ANSWER: ok");
    }

    #[test]
    fn test_lowercase_phrase_in_answer_is_not_analysis() {
        let raw = "Tenemos envíos a todo el país; sin embargo, tardan más.\n\nthis version ships today.";
        assert_eq!(extract_final_answer(raw), raw);
    }

    #[test]
    fn test_last_paragraph_after_analysis() {
        let raw = "La respuesta generada es correcta pero larga.\n\nHola, ¿en qué te ayudo?";
        assert_eq!(extract_final_answer(raw), "Hola, ¿en qué te ayudo?");
    }

    #[test]
    fn test_last_paragraph_that_is_analysis_is_rejected() {
        let raw = "Una versión mejorada sería más corta.\n\nSin embargo, está bien.";
        assert_eq!(extract_final_answer(raw), raw);
    }

    #[test]
    fn test_plain_output_unchanged() {
        let raw = "Hola.\n\nTengo tres modelos disponibles.";
        assert_eq!(extract_final_answer(raw), raw);
    }

    #[test]
    fn test_plain_output_quotes_stripped() {
        assert_eq!(extract_final_answer("\"Claro que sí\""), "Claro que sí");
    }

    #[test]
    fn test_empty_marker_tail_falls_through() {
        assert_eq!(extract_final_answer("Respuesta final:"), "Respuesta final:");
    }

    // ---- Structured output ----

    #[test]
    fn test_structured_field() {
        let r = refiner(ScriptedModel::replying(&[])).with_structured_output("respuesta");
        assert_eq!(r.extract(r#"{"respuesta": "¡Hola!"}"#), "¡Hola!");
    }

    #[test]
    fn test_structured_in_code_fence() {
        let r = refiner(ScriptedModel::replying(&[])).with_structured_output("respuesta");
        let raw = "```json\n{\"respuesta\": \"\\\"Listo\\\"\"}\n```";
        assert_eq!(r.extract(raw), "Listo");
    }

    #[test]
    fn test_structured_missing_field_uses_heuristics() {
        let r = refiner(ScriptedModel::replying(&[])).with_structured_output("respuesta");
        assert_eq!(r.extract("Respuesta final: sí"), "sí");
        assert_eq!(r.extract(r#"{"answer": "x"}"#), r#"{"answer": "x"}"#);
    }

    // ---- Request shape ----

    #[test]
    fn test_supervisor_request() {
        let r = refiner(ScriptedModel::replying(&[]));
        let context = ConversationSnapshot {
            role: Some("abogado".to_string()),
            turns: vec!["Usuario: hola".to_string(), "Asistente: Hola".to_string()],
        };
        let req = r.build_request("Hola", "hola", &context);
        assert_eq!(req.messages[0].content.text(), "Eres el supervisor.");
        let prompt = req.messages[1].content.text();
        assert!(prompt.starts_with("Mensaje del usuario: \"hola\"\n\nRespuesta generada: \"Hola\""));
        assert!(prompt.contains("\n\nROL ACTUAL DEL ASISTENTE: abogado"));
        assert!(prompt.contains("\n\nCONTEXTO DE LA CONVERSACIÓN:\nUsuario: hola\nAsistente: Hola"));
        assert!(prompt.ends_with("criterios de supervisión."));
        assert!((req.sampling.temperature - 0.3).abs() < f32::EPSILON);
        assert!(req.response_format.is_none());
    }

    #[test]
    fn test_supervisor_request_without_role_or_history() {
        let r = refiner(ScriptedModel::replying(&[]));
        let req = r.build_request("Hola", "hola", &ConversationSnapshot::default());
        let prompt = req.messages[1].content.text();
        assert!(!prompt.contains("ROL ACTUAL"));
        assert!(!prompt.contains("CONTEXTO"));
    }

    #[test]
    fn test_structured_request() {
        let r = refiner(ScriptedModel::replying(&[]))
            .with_structured_output("respuesta")
            .with_json_response_format(true);
        let req = r.build_request("x", "y", &ConversationSnapshot::default());
        assert!(req.messages[0].content.text().ends_with("con el campo \"respuesta\"."));
        assert_eq!(req.response_format, Some(ResponseFormat::JsonObject));
    }

    #[test]
    fn test_from_config_uses_supervisor_temperature() {
        let model = ScriptedModel::replying(&[]);
        let r = ResponseRefiner::from_config(
            model,
            &SupervisorConfig::default(),
            &PersonaConfig::default(),
            &ProviderConfig::default(),
        );
        let req = r.build_request("x", "y", &ConversationSnapshot::default());
        assert!((req.sampling.temperature - 0.3).abs() < f32::EPSILON);
        assert!(req.messages[0].content.text().contains("\"respuesta\""));
    }

    // ---- refine() ----

    #[tokio::test]
    async fn test_refine_returns_supervisor_text() {
        let model = ScriptedModel::replying(&["\"¡Hola! ¿Qué buscas?\""]);
        let r = refiner(model.clone());
        let out = r.refine("Hola, qué buscas", "hola", &ConversationSnapshot::default()).await;
        assert_eq!(out, "¡Hola! ¿Qué buscas?");
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_refine_failure_returns_stripped_draft() {
        let model = ScriptedModel::new(vec![Err(GatewayError::Status {
            status: 500,
            body: "boom".to_string(),
        })]);
        let r = refiner(model);
        let out = r.refine("'Hola'", "hola", &ConversationSnapshot::default()).await;
        assert_eq!(out, "Hola");
    }

    #[tokio::test]
    async fn test_refine_empty_output_returns_draft() {
        let r = refiner(ScriptedModel::replying(&["  \"\"  "]));
        let out = r.refine("Hola", "hola", &ConversationSnapshot::default()).await;
        assert_eq!(out, "Hola");
    }

    #[tokio::test]
    async fn test_refine_empty_draft_stays_empty() {
        let r = refiner(ScriptedModel::new(vec![Err(GatewayError::EmptyCompletion)]));
        let out = r.refine("", "hola", &ConversationSnapshot::default()).await;
        assert_eq!(out, "");
    }
}
