use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotObject,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config read error: {0}")]
    ReadError(String),

    #[error("config parse error: {0}")]
    ParseError(String),
}
