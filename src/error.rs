use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid scan interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Feed config {0} not found")]
    FeedConfigNotFound(i64),

    #[error("Refresh already in progress for feed config {0}")]
    RefreshInProgress(i64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("Worker is not running")]
    WorkerUnavailable,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Unexpected worker response: {0}")]
    UnexpectedResponse(&'static str),

    #[error("Dev operations are disabled")]
    DevOpsDisabled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
