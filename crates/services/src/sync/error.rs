use thiserror::Error;

/// Failures of the local snapshot cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors emitted by the client sync engine and its HTTP client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("no active session")]
    NoSession,
    #[error(transparent)]
    Invalid(#[from] progress_core::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("progress api returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed snapshot: {0}")]
    Format(#[from] serde_json::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("invalid sync configuration: {0}")]
    Config(String),
}
