/*
[INPUT]:  Error sources (HTTP, custody API, storage, auth callback, session)
[OUTPUT]: Structured error types with category predicates
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

use crate::types::AuthCallbackCode;

/// Main error type for the Lantern connect SDK
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Configuration error (missing field, invalid value); never retried
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wallet connection failed (user rejected, provider unavailable)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Requested wallet id is not present in the registry
    #[error("Wallet not found: {wallet_id}")]
    WalletNotFound { wallet_id: String },

    /// Host storage could not be read or written
    #[error("Storage error: unable to access browser storage: {0}")]
    Storage(String),

    /// HTTP request failed
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Custody API returned an error response
    #[error("Custody API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Persisted session is missing, stale, or unusable
    #[error("Session error: {0}")]
    Session(String),

    /// CSRF state token missing or mismatched during redirect resume
    #[error("CSRF validation failed: {0}")]
    Csrf(String),

    /// The identity provider redirected back with an error
    #[error("Authentication callback error ({code:?}): {message}")]
    AuthCallback {
        code: AuthCallbackCode,
        message: String,
    },

    /// JWT validation or exchange failed
    #[error("JWT authentication error: {0}")]
    Jwt(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    /// Operation exceeded its time budget
    #[error("Timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl ConnectError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectError::Http(_) | ConnectError::RateLimit { .. } | ConnectError::Timeout { .. } => true,
            ConnectError::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Check if the error is terminal for the current auth attempt
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ConnectError::Session(_)
                | ConnectError::Csrf(_)
                | ConnectError::AuthCallback { .. }
                | ConnectError::Jwt(_)
        )
    }

    /// Create a custody API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        ConnectError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }

    /// Map a JWT-exchange HTTP status to its user-meaningful error
    pub fn jwt_status_error(status: StatusCode, message: &str) -> Self {
        let text = match status.as_u16() {
            400 => format!("invalid JWT authentication request: {message}"),
            401 => format!("JWT token is invalid or expired: {message}"),
            403 => format!("JWT authentication forbidden: {message}"),
            404 => format!("JWT authentication endpoint not found: {message}"),
            429 => format!("too many JWT authentication requests: {message}"),
            500..=599 => format!("JWT authentication server error: {message}"),
            code => format!("JWT authentication failed (HTTP {code}): {message}"),
        };
        ConnectError::Jwt(text)
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, ConnectError>;
