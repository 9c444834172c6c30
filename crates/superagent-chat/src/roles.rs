//! Role inference: detects explicit persona requests in user messages.
//!
//! An ordered list of case-insensitive patterns; the first match wins.
//! Misses are expected, the classifier only recognises direct requests.

use regex::Regex;
use std::sync::LazyLock;

use superagent_core::config::RolesConfig;

use crate::error::ChatError;

// =============================================================================
// Built-in patterns (compiled once, reused across calls)
// =============================================================================

const ES_ASK: &str = r"\b(eres|actúa|actua|sé|se|comporta)";
const EN_ASK: &str = r"\b(you\s+are|act(ing)?\s+as|be|pretend\s+to\s+be|behave\s+like)\b";

static DEFAULT_PATTERNS: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    let table: Vec<(String, &str)> = vec![
        // Spanish
        (
            format!(r"{ES_ASK}.*(vendedor|agente)\s+de\s+(casas?|inmuebles?|propiedad(es)?)"),
            "vendedor de casas",
        ),
        (
            format!(r"{ES_ASK}.*(vendedor|agente)\s+de\s+(autos?|coches?|carros?)"),
            "vendedor de autos",
        ),
        (format!(r"{ES_ASK}.*(abogado|legal|jurídico|juridico)"), "abogado"),
        (format!(r"{ES_ASK}.*(médico|medico|doctor)"), "médico"),
        (
            r"\bv[ée]ndeme\s+(una\s+(casa|propiedad)|un\s+inmueble)".to_string(),
            "vendedor de casas",
        ),
        (r"\bv[ée]ndeme\s+un\s+(auto|coche|carro)".to_string(), "vendedor de autos"),
        // English
        (
            format!(
                r"{EN_ASK}.*\b((home|house|real\s+estate|property)\s+(seller|agent|salesman|salesperson)|realtor)"
            ),
            "home seller",
        ),
        (
            format!(r"{EN_ASK}.*\b(car|auto)\s+(seller|dealer|salesman|salesperson)"),
            "car seller",
        ),
        (format!(r"{EN_ASK}.*\b(lawyer|attorney|legal\s+advisor)"), "lawyer"),
        (format!(r"{EN_ASK}.*\b(doctor|physician)"), "doctor"),
        (r"\bsell\s+me\s+a\s+(house|home|property)".to_string(), "home seller"),
        (r"\bsell\s+me\s+a\s+car\b".to_string(), "car seller"),
    ];

    table
        .into_iter()
        .map(|(pattern, role)| {
            let re = Regex::new(&format!("(?i){}", pattern)).expect("Invalid role regex");
            (re, role.to_string())
        })
        .collect()
});

// =============================================================================
// RoleInference
// =============================================================================

/// Ordered role classifier: configured patterns first, then the built-ins.
#[derive(Debug, Clone)]
pub struct RoleInference {
    custom: Vec<(Regex, String)>,
    include_defaults: bool,
}

impl Default for RoleInference {
    fn default() -> Self {
        Self {
            custom: Vec::new(),
            include_defaults: true,
        }
    }
}

impl RoleInference {
    /// Build from configuration, compiling custom patterns case-insensitively.
    pub fn from_config(config: &RolesConfig) -> Result<Self, ChatError> {
        let custom = config
            .custom
            .iter()
            .map(|entry| {
                Regex::new(&format!("(?i){}", entry.pattern))
                    .map(|re| (re, entry.role.clone()))
                    .map_err(|e| ChatError::InvalidRolePattern {
                        pattern: entry.pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            custom,
            include_defaults: config.include_defaults,
        })
    }

    /// Return the first role whose pattern matches `message`.
    pub fn infer(&self, message: &str) -> Option<&str> {
        let defaults: &[(Regex, String)] = if self.include_defaults {
            DEFAULT_PATTERNS.as_slice()
        } else {
            &[]
        };
        self.custom
            .iter()
            .chain(defaults.iter())
            .find(|(re, _)| re.is_match(message))
            .map(|(_, role)| role.as_str())
    }

    /// Number of active patterns.
    pub fn len(&self) -> usize {
        self.custom.len()
            + if self.include_defaults {
                DEFAULT_PATTERNS.len()
            } else {
                0
            }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
