//! Custom error types for floatchat

use thiserror::Error;

/// Main error type for floatchat operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Narration error: {0}")]
    Narrate(String),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Permanent remote error: {0}")]
    RemoteTerminal(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Query validation error: {0}")]
    QueryValidation(String),

    #[error("Query timed out after {0}s")]
    QueryTimeout(u64),

    #[error("Profile ID range exhausted for store '{0}'")]
    IdRangeExhausted(String),

    #[error("Float not found: {0}")]
    FloatNotFound(String),

    #[error("Ingestion already running for store '{0}'")]
    IngestLocked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'floatchat init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for floatchat
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}
