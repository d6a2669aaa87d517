//! Error types for atcwatch

use thiserror::Error;

/// Result type alias for atcwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

/// Errors from outbound data-plane calls (live feed, member API)
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            FetchError::Network("Failed to connect to API".to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Errors from the persistent store document
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store write conflict: the document changed underneath us")]
    Conflict,

    #[error("Store transport error: {0}")]
    Transport(String),

    #[error("Store write failed: {0}")]
    Fatal(String),

    #[error("Store document is not valid JSON: {0}")]
    Corrupt(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Transport("Request timed out".to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is required but not set")]
    MissingVar(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_not_found() {
        let err = FetchError::NotFound("member 1234567".to_string());
        assert!(err.to_string().contains("1234567"));
    }

    #[test]
    fn test_fetch_error_rate_limited() {
        let err = FetchError::RateLimited(30);
        let msg = err.to_string();
        assert!(msg.contains("Rate limited"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_store_error_conflict() {
        let err = StoreError::Conflict;
        assert!(err.to_string().contains("conflict"));
    }

    #[test]
    fn test_config_error_missing_var() {
        let err = ConfigError::MissingVar("GITHUB_TOKEN");
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_error_from_fetch_error() {
        let fetch_err = FetchError::ServerError("boom".to_string());
        let err: Error = fetch_err.into();
        match err {
            Error::Fetch(FetchError::ServerError(_)) => (),
            _ => panic!("Expected Error::Fetch(FetchError::ServerError)"),
        }
    }

    #[test]
    fn test_error_from_store_error() {
        let store_err = StoreError::Conflict;
        let err: Error = store_err.into();
        match err {
            Error::Store(StoreError::Conflict) => (),
            _ => panic!("Expected Error::Store(StoreError::Conflict)"),
        }
    }
}
