use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SuperagentError};
use crate::persona::{Labels, Language};

/// Top-level configuration for the SuperAgent backend.
///
/// Loaded from a TOML file, then overlaid with environment variables
/// (see [`SuperagentConfig::apply_env_overrides`]). Each section corresponds
/// to one component of the request pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuperagentConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub model: ProviderConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl SuperagentConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SuperagentConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from an environment lookup.
    ///
    /// Empty values are ignored. Unparseable numbers are logged and ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SUPERAGENT_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SUPERAGENT_PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %v, "Ignoring invalid SUPERAGENT_PORT"),
            }
        }
        if let Some(v) = get("SUPERAGENT_ENV") {
            self.server.environment = v;
        }
        if let Some(v) = get("SUPERAGENT_CORS_DEV_ORIGINS") {
            self.server.cors_dev_origins = split_list(&v);
        }
        if let Some(v) = get("SUPERAGENT_CORS_PROD_ORIGINS") {
            self.server.cors_prod_origins = split_list(&v);
        }
        if let Some(v) = get("SUPERAGENT_LANGUAGE") {
            match v.parse::<Language>() {
                Ok(lang) => self.persona.language = lang,
                Err(e) => warn!(error = %e, "Ignoring SUPERAGENT_LANGUAGE"),
            }
        }

        if let Some(v) = get("MODEL_API_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = get("MODEL_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Some(v) = get("MODEL_NAME") {
            self.model.model = v;
        }

        if let Some(v) = get("SUPERVISOR_API_URL") {
            self.supervisor.base_url = Some(v);
        }
        if let Some(v) = get("SUPERVISOR_API_KEY") {
            self.supervisor.api_key = Some(v);
        }
        if let Some(v) = get("SUPERVISOR_MODEL") {
            self.supervisor.model = Some(v);
        }

        if let Some(v) = get("RAG_ENABLED") {
            self.rag.enabled = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = get("QDRANT_URL") {
            self.rag.qdrant_url = v;
        }
        if let Some(v) = get("QDRANT_API_KEY") {
            self.rag.qdrant_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.rag.embedding.api_key = Some(v);
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.rag.embedding.model = v;
        }
        if let Some(v) = get("RAG_ANSWER_API_KEY") {
            self.rag.answer.api_key = Some(v);
        }
        if let Some(v) = get("RAG_DATABASE_PATH") {
            self.rag.database_path = v;
        }
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let s = &self.streaming;
        if s.min_delay_ms > s.max_delay_ms {
            return Err(SuperagentError::Config(format!(
                "streaming.min_delay_ms ({}) exceeds streaming.max_delay_ms ({})",
                s.min_delay_ms, s.max_delay_ms
            )));
        }
        if self.rag.chunk_size == 0 || self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(SuperagentError::Config(format!(
                "rag.chunk_overlap ({}) must be smaller than a non-zero rag.chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.rag.score_threshold) {
            return Err(SuperagentError::Config(format!(
                "rag.score_threshold must be within [0, 1], got {}",
                self.rag.score_threshold
            )));
        }
        for entry in &self.auth.api_keys {
            if entry.key.trim().is_empty() || entry.tenant.trim().is_empty() {
                return Err(SuperagentError::Config(
                    "auth.api_keys entries need a non-empty key and tenant".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// "development" or "production"; selects the CORS origin list.
    pub environment: String,
    pub cors_dev_origins: Vec<String>,
    pub cors_prod_origins: Vec<String>,
    /// Request body limit in bytes (document uploads included).
    pub max_body_bytes: usize,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Origins allowed for the current environment.
    pub fn cors_origins(&self) -> &[String] {
        if self.is_production() {
            &self.cors_prod_origins
        } else {
            &self.cors_dev_origins
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "development".to_string(),
            cors_dev_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            cors_prod_origins: Vec::new(),
            max_body_bytes: 10 * 1024 * 1024,
            log_level: "info".to_string(),
        }
    }
}

/// How a newly inferred role interacts with one already on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolePolicy {
    /// A later explicit role request replaces the current role.
    #[default]
    Override,
    /// The first inferred role is kept until the conversation is reset.
    Sticky,
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Maximum stored turns per user (user and assistant turns both count).
    pub max_turns: usize,
    /// Idle time after which a conversation is forgotten.
    pub ttl_minutes: u32,
    /// Interval of the background expiry sweep.
    pub sweep_interval_secs: u64,
    pub role_policy: RolePolicy,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            ttl_minutes: 30,
            sweep_interval_secs: 60,
            role_policy: RolePolicy::Override,
        }
    }
}

/// Assistant persona: language preset plus optional prompt overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reply: Option<String>,
    /// Model description reported by `GET /status`.
    pub model_label: String,
    /// Feature list reported by `GET /status`.
    pub features: Vec<String>,
}

impl PersonaConfig {
    pub fn labels(&self) -> &'static Labels {
        self.language.labels()
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(self.labels().system_prompt)
    }

    pub fn supervisor_prompt(&self) -> &str {
        self.supervisor_prompt
            .as_deref()
            .unwrap_or(self.labels().supervisor_prompt)
    }

    pub fn fallback_reply(&self) -> &str {
        self.fallback_reply
            .as_deref()
            .unwrap_or(self.labels().fallback_reply)
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            language: Language::Es,
            system_prompt: None,
            supervisor_prompt: None,
            fallback_reply: None,
            model_label: "Llama-4-Maverick (Fireworks AI)".to_string(),
            features: vec![
                "Supervisor".to_string(),
                "Streaming".to_string(),
                "Contextual Memory".to_string(),
                "Role Persistence".to_string(),
            ],
        }
    }
}

/// An OpenAI-compatible chat-completion provider and its sampling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Groq settings used to synthesize grounded answers.
    pub fn groq_answer() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
            top_p: None,
            top_k: None,
            presence_penalty: None,
            frequency_penalty: None,
            max_tokens: Some(500),
            timeout_secs: 60,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.fireworks.ai/inference/v1".to_string(),
            api_key: None,
            model: "accounts/fireworks/models/llama4-maverick-instruct-basic".to_string(),
            temperature: 0.5,
            top_p: Some(1.0),
            top_k: Some(40),
            presence_penalty: Some(0.2),
            frequency_penalty: Some(0.3),
            max_tokens: Some(1024),
            timeout_secs: 60,
        }
    }
}

/// Second-pass supervisor settings.
///
/// Unset provider fields inherit from `[model]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub enabled: bool,
    pub temperature: f32,
    /// Ask the supervisor for a JSON object instead of free text.
    pub structured_output: bool,
    /// Name of the JSON field holding the corrected answer.
    pub answer_field: String,
    /// Also send `response_format: {"type": "json_object"}`.
    pub json_response_format: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl SupervisorConfig {
    /// Provider settings for the supervisor call.
    pub fn provider(&self, primary: &ProviderConfig) -> ProviderConfig {
        let mut provider = primary.clone();
        provider.temperature = self.temperature;
        if let Some(ref url) = self.base_url {
            provider.base_url = url.clone();
        }
        if let Some(ref key) = self.api_key {
            provider.api_key = Some(key.clone());
        }
        if let Some(ref model) = self.model {
            provider.model = model.clone();
        }
        provider
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            temperature: 0.3,
            structured_output: true,
            answer_field: "respuesta".to_string(),
            json_response_format: false,
            base_url: None,
            api_key: None,
            model: None,
        }
    }
}

/// A user-supplied role pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePatternConfig {
    /// Regular expression, matched case-insensitively.
    pub pattern: String,
    /// Role label stored when the pattern matches.
    pub role: String,
}

/// Role inference settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    /// Evaluated before the built-in patterns.
    pub custom: Vec<RolePatternConfig>,
    pub include_defaults: bool,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            custom: Vec::new(),
            include_defaults: true,
        }
    }
}

/// Simulated typing delay for `/api/chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub ms_per_char: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            ms_per_char: 5,
            min_delay_ms: 500,
            max_delay_ms: 1500,
        }
    }
}

/// Vector store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Qdrant,
    /// In-process store; contents are lost on restart.
    Memory,
}

/// Embedding API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout_secs: 30,
        }
    }
}

/// Retrieval-augmented generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub enabled: bool,
    pub backend: VectorBackend,
    pub qdrant_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key: Option<String>,
    /// Collection name is `<prefix><tenant>`.
    pub collection_prefix: String,
    pub score_threshold: f32,
    pub default_limit: usize,
    /// Snippets injected into chat prompts.
    pub chat_limit: usize,
    /// Score multiplier for keyword hits.
    pub keyword_boost: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Characters of extracted text kept in the document registry.
    pub preview_chars: usize,
    pub database_path: String,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default = "ProviderConfig::groq_answer")]
    pub answer: ProviderConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: VectorBackend::Qdrant,
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_api_key: None,
            collection_prefix: "org_".to_string(),
            score_threshold: 0.7,
            default_limit: 5,
            chat_limit: 3,
            keyword_boost: 1.2,
            chunk_size: 1000,
            chunk_overlap: 200,
            preview_chars: 5000,
            database_path: "superagent-rag.db".to_string(),
            embedding: EmbeddingConfig::default(),
            answer: ProviderConfig::groq_answer(),
        }
    }
}

/// An API key and the tenant it authenticates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub tenant: String,
}

/// Tenant resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When non-empty, `/rag` routes require one of these bearer keys.
    pub api_keys: Vec<ApiKeyEntry>,
    pub default_tenant: String,
    /// Header naming the tenant when no key is presented.
    pub tenant_header: String,
}

impl AuthConfig {
    pub fn tenant_for_key(&self, key: &str) -> Option<&str> {
        self.api_keys
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.tenant.as_str())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            default_tenant: "default".to_string(),
            tenant_header: "x-tenant-id".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = SuperagentConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.conversation.max_turns, 10);
        assert_eq!(config.conversation.ttl_minutes, 30);
        assert_eq!(config.conversation.role_policy, RolePolicy::Override);
        assert_eq!(config.persona.language, Language::Es);
        assert!((config.model.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.model.top_k, Some(40));
        assert_eq!(config.model.max_tokens, Some(1024));
        assert!(config.supervisor.enabled);
        assert!((config.supervisor.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.supervisor.answer_field, "respuesta");
        assert_eq!(config.streaming.min_delay_ms, 500);
        assert_eq!(config.streaming.max_delay_ms, 1500);
        assert!(!config.rag.enabled);
        assert_eq!(config.rag.collection_prefix, "org_");
        assert_eq!(config.rag.embedding.dimensions, 1536);
        assert_eq!(config.rag.answer.model, "llama-3.3-70b-versatile");
        assert_eq!(config.rag.answer.max_tokens, Some(500));
        assert_eq!(config.auth.default_tenant, "default");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[server]
port = 8080

[persona]
language = "en"

[rag]
enabled = true
backend = "memory"
"#;
        let file = create_temp_config(content);
        let config = SuperagentConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.persona.language, Language::En);
        assert_eq!(config.persona.labels().user_turn, "User");
        assert!(config.rag.enabled);
        assert_eq!(config.rag.backend, VectorBackend::Memory);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.answer.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_load_custom_roles_and_keys() {
        let content = r#"
[[roles.custom]]
pattern = "\\bsommelier\\b"
role = "sommelier"

[[auth.api_keys]]
key = "k-123"
tenant = "acme"
"#;
        let file = create_temp_config(content);
        let config = SuperagentConfig::load(file.path()).unwrap();
        assert_eq!(config.roles.custom.len(), 1);
        assert_eq!(config.roles.custom[0].role, "sommelier");
        assert!(config.roles.include_defaults);
        assert_eq!(config.auth.tenant_for_key("k-123"), Some("acme"));
        assert_eq!(config.auth.tenant_for_key("other"), None);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(SuperagentConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = SuperagentConfig::load_or_default(Path::new("/nonexistent/superagent.toml"));
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("superagent.toml");

        let mut config = SuperagentConfig::default();
        config.conversation.max_turns = 4;
        config.persona.system_prompt = Some("Eres breve.".to_string());
        config.save(&path).unwrap();

        let reloaded = SuperagentConfig::load(&path).unwrap();
        assert_eq!(reloaded.conversation.max_turns, 4);
        assert_eq!(reloaded.persona.system_prompt(), "Eres breve.");
        assert_eq!(reloaded.model.model, config.model.model);
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("SUPERAGENT_PORT", "9090"),
            ("SUPERAGENT_ENV", "production"),
            ("SUPERAGENT_CORS_PROD_ORIGINS", "https://a.example, https://b.example"),
            ("MODEL_API_KEY", "fw-key"),
            ("SUPERVISOR_MODEL", "small-model"),
            ("QDRANT_URL", "http://qdrant:6333"),
            ("OPENAI_API_KEY", "sk-test"),
            ("RAG_ENABLED", "true"),
        ]);
        let mut config = SuperagentConfig::default();
        config.apply_env_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.server.port, 9090);
        assert!(config.server.is_production());
        assert_eq!(
            config.server.cors_origins(),
            &["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.model.api_key.as_deref(), Some("fw-key"));
        assert_eq!(config.supervisor.model.as_deref(), Some("small-model"));
        assert_eq!(config.rag.qdrant_url, "http://qdrant:6333");
        assert_eq!(config.rag.embedding.api_key.as_deref(), Some("sk-test"));
        assert!(config.rag.enabled);
    }

    #[test]
    fn test_env_invalid_port_ignored() {
        let vars = env(&[("SUPERAGENT_PORT", "not-a-port"), ("MODEL_NAME", "  ")]);
        let mut config = SuperagentConfig::default();
        config.apply_env_overrides(|k| vars.get(k).cloned());
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.model.model,
            "accounts/fireworks/models/llama4-maverick-instruct-basic"
        );
    }

    #[test]
    fn test_cors_origins_development() {
        let config = ServerConfig::default();
        assert!(!config.is_production());
        assert!(config
            .cors_origins()
            .contains(&"http://localhost:5173".to_string()));
    }

    #[test]
    fn test_supervisor_provider_inherits_primary() {
        let primary = ProviderConfig {
            api_key: Some("primary-key".to_string()),
            ..ProviderConfig::default()
        };
        let supervisor = SupervisorConfig {
            model: Some("judge".to_string()),
            ..SupervisorConfig::default()
        };
        let provider = supervisor.provider(&primary);
        assert_eq!(provider.model, "judge");
        assert_eq!(provider.api_key.as_deref(), Some("primary-key"));
        assert_eq!(provider.base_url, primary.base_url);
        assert!((provider.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_persona_overrides() {
        let persona = PersonaConfig {
            fallback_reply: Some("Ups.".to_string()),
            ..PersonaConfig::default()
        };
        assert_eq!(persona.fallback_reply(), "Ups.");
        assert_eq!(persona.system_prompt(), Language::Es.labels().system_prompt);
    }

    #[test]
    fn test_validate_defaults_ok() {
        assert!(SuperagentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_delays() {
        let mut config = SuperagentConfig::default();
        config.streaming.min_delay_ms = 2000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_delay_ms"));
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_chunk() {
        let mut config = SuperagentConfig::default();
        config.rag.chunk_overlap = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_api_key_entry() {
        let mut config = SuperagentConfig::default();
        config.auth.api_keys.push(ApiKeyEntry {
            key: "".to_string(),
            tenant: "acme".to_string(),
        });
        assert!(config.validate().is_err());
    }
}
