use thiserror::Error;

/// Top-level error type for the SuperAgent backend.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for SuperagentError` so that the `?` operator works
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SuperagentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model gateway error: {0}")]
    Gateway(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SuperagentError {
    fn from(err: toml::de::Error) -> Self {
        SuperagentError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SuperagentError {
    fn from(err: toml::ser::Error) -> Self {
        SuperagentError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SuperagentError {
    fn from(err: serde_json::Error) -> Self {
        SuperagentError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for SuperAgent operations.
pub type Result<T> = std::result::Result<T, SuperagentError>;
