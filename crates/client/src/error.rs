use augustus_shared::MAX_QUERY_LENGTH;
use thiserror::Error;

/// Failures from the gateway as seen by the client core.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("query exceeds {MAX_QUERY_LENGTH} characters")]
    QueryTooLong,
}

impl ApiError {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            _ => ApiError::Status { status, message },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            ApiError::Malformed(_) | ApiError::QueryTooLong => None,
        }
    }

    /// Text for the inline error bubble.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) => "Your session has expired. Please sign in again.".to_string(),
            ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Status { message: msg, .. } => {
                if msg.is_empty() {
                    "Something went wrong. Please try again.".to_string()
                } else {
                    msg.clone()
                }
            }
            ApiError::Network(_) => "Could not reach the server. Please try again.".to_string(),
            ApiError::Malformed(_) => "The server sent an unexpected response. Please try again.".to_string(),
            ApiError::QueryTooLong => format!("Query too long (max {} characters).", MAX_QUERY_LENGTH),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server url '{0}': expected an absolute http(s) url")]
    InvalidUrl(String),

    #[error("could not find home directory")]
    NoHome,

    #[error("failed to read config at {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
