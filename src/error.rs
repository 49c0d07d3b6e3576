use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepostatsError>;

#[derive(Error, Debug)]
pub enum RepostatsError {
    #[error("Authentication failed ({status}) for {url}: {message}")]
    Authentication {
        status: u16,
        url: String,
        message: String,
    },
    #[error("Not found: {url}")]
    NotFound { url: String },
    #[error("Rate limit exceeded: quota resets at {reset_at}")]
    RateLimitExceeded { reset_at: DateTime<Utc> },
    #[error("Request failed ({status}) for {url}: {message}")]
    Transient {
        status: u16,
        url: String,
        message: String,
    },
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    Schema { expected: u32, found: u32 },
}

impl RepostatsError {
    /// Errors that must stop a whole batch instead of a single repository.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RepostatsError::Authentication { .. })
    }

    pub(crate) fn malformed(url: &str, reason: impl ToString) -> Self {
        RepostatsError::MalformedResponse {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
