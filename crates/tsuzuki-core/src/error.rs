use thiserror::Error;

#[derive(Debug, Error)]
pub enum TsuzukiError {
    #[cfg(feature = "sqlite")]
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid episode range: {0}")]
    InvalidRange(String),

    #[error("stored list could not be read, refusing to overwrite it: {0}")]
    Unreadable(String),

    #[error("not found: {0}")]
    NotFound(String),
}
