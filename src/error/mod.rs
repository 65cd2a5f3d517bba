//! Error types for anystore.

use thiserror::Error;

use crate::auth::AuthError;
use crate::permissions::Permission;

/// Primary error type for all store operations.
///
/// Resolution failure (no adapter matches a URL) is *not* an error: the
/// resolver returns `None` and the caller decides the fallback.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        /// Raw response body, for adapters that branch on its contents.
        body: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthError),

    #[error("{0}")]
    SessionExpired(String),

    #[error("Permission denied ({action}): {message}")]
    Permission { action: Permission, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid source URL: {0}")]
    InvalidSource(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Network,
    Api,
    Server,
    Permission,
    NotFound,
    Configuration,
    Serialization,
    Unknown,
}

impl StoreError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            body: body.into(),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) | Self::SessionExpired(_) => ErrorCategory::Authentication,
            Self::Network(_) => ErrorCategory::Network,
            Self::Permission { .. } => ErrorCategory::Permission,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                404 => ErrorCategory::NotFound,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Server
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_classifies_categories() {
        assert_eq!(
            StoreError::api(401, "unauthorized", "").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            StoreError::api(404, "missing", "").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StoreError::api(503, "down", "").category(),
            ErrorCategory::Server
        );
        assert_eq!(
            StoreError::api(422, "bad", "").category(),
            ErrorCategory::Api
        );
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(StoreError::api(500, "oops", "").is_retryable());
        assert!(!StoreError::api(400, "bad", "").is_retryable());
        assert!(!StoreError::SessionExpired("expired".into()).is_retryable());
    }

    #[test]
    fn status_is_exposed_for_api_errors_only() {
        assert_eq!(StoreError::api(404, "missing", "").status(), Some(404));
        assert_eq!(StoreError::NotFound("x".into()).status(), None);
    }
}
