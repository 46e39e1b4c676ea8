use thiserror::Error;

/// Common error type for homesense components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid environment variable {key}: {message}")]
    Env { key: String, message: String },
}

/// Result type alias using homesense's Error.
pub type Result<T> = std::result::Result<T, Error>;
