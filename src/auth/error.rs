use thiserror::Error;

/// Normalized authentication errors.
///
/// `Clone` so a single in-flight login outcome can be delivered to every
/// caller that joined the attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("No OAuth client id configured for provider '{0}'")]
    MissingClientId(String),
    #[error("Login window could not be opened: {0}")]
    PopupBlocked(String),
    #[error("Login window was closed before completing authentication")]
    PopupClosed,
    #[error("Timed out waiting for the login handshake")]
    HandshakeTimeout,
    #[error("Login was rejected: {0}")]
    HandshakeRejected(String),
    #[error("Access token was rejected by the provider")]
    TokenRejected,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidResponse(error.to_string())
    }
}
