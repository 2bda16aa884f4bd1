use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("remote returned status {0}")]
    RemoteUnavailable(u16),

    #[error("session token not found in marketplace page")]
    TokenExtraction,

    #[error("remote rejected program run: {0}")]
    ProgramExecution(String),

    #[error("remote flagged this account as blocked")]
    RateLimited,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
