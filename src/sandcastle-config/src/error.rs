use thiserror::Error;

/// Errors raised while reading or parsing policy documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The policy file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid JSON or does not match the policy schema.
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is valid JSON but has the wrong structure.
    #[error("invalid policy shape: {0}")]
    InvalidShape(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
