use serde::Serialize;

/// Client-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure class used for user messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The backend could not be reached at all
    Network,
    /// Anything else: non-2xx responses, undecodable bodies, storage faults
    Other,
}

impl AppError {
    /// Classifies the error for the user-facing error descriptor.
    ///
    /// Connection failures and timeouts count as `Network`; a response that
    /// arrived but was rejected or malformed is `Other`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::HttpClient(e) if e.is_connect() || e.is_timeout() => ErrorKind::Network,
            AppError::HttpClient(e) if e.is_request() && e.status().is_none() => {
                ErrorKind::Network
            }
            _ => ErrorKind::Other,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
