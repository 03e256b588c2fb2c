/// Unified error types for the GidiPIN auth service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the auth service
#[derive(Error, Debug)]
pub enum AuthError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Refresh token is unknown or revoked. Revoked and not-found are
    /// deliberately the same variant so callers cannot tell them apart.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Refresh token exists but its lifetime has passed
    #[error("Refresh token expired")]
    RefreshTokenExpired,

    /// Access token could not be decoded or is missing required claims
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Authentication errors (bad bearer token, expired access token)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Verification code is wrong, expired, or already used. One variant
    /// for all three causes.
    #[error("Invalid or expired verification code")]
    InvalidCode,

    /// Code issuance attempted inside the cooldown window
    #[error("Rate limit exceeded")]
    CodeCooldown { retry_after: std::time::Duration },

    /// Submitted PIN did not match
    #[error("Incorrect PIN")]
    IncorrectPin,

    /// PIN verification rejected while the lockout window is active
    #[error("Account locked")]
    AccountLocked { retry_after: std::time::Duration },

    /// Global request rate limiting
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "remainingSeconds")]
    pub remaining_seconds: Option<u64>,
}

/// Convert AuthError to HTTP response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message, remaining) = match &self {
            AuthError::InvalidRefreshToken => (
                StatusCode::UNAUTHORIZED,
                "INVALID_REFRESH_TOKEN",
                self.to_string(),
                None,
            ),
            AuthError::RefreshTokenExpired => (
                StatusCode::UNAUTHORIZED,
                "REFRESH_TOKEN_EXPIRED",
                self.to_string(),
                None,
            ),
            AuthError::InvalidTokenFormat(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_TOKEN_FORMAT",
                self.to_string(),
                None,
            ),
            AuthError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_REQUIRED",
                self.to_string(),
                None,
            ),
            AuthError::InvalidCode => (
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_CODE",
                self.to_string(),
                None,
            ),
            AuthError::CodeCooldown { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "ERR_RATE_LIMIT",
                format!(
                    "Too many requests. Please wait {} seconds",
                    retry_after.as_secs()
                ),
                Some(retry_after.as_secs()),
            ),
            AuthError::IncorrectPin => (
                StatusCode::UNAUTHORIZED,
                "INCORRECT_PIN",
                self.to_string(),
                None,
            ),
            AuthError::AccountLocked { retry_after } => (
                StatusCode::LOCKED,
                "ACCOUNT_LOCKED",
                format!(
                    "Account locked. Try again in {} seconds",
                    retry_after.as_secs()
                ),
                Some(retry_after.as_secs()),
            ),
            AuthError::RateLimitExceeded { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Rate limit exceeded".to_string(),
                Some(retry_after.as_secs()),
            ),
            AuthError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                self.to_string(),
                None,
            ),
            AuthError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                self.to_string(),
                None,
            ),
            AuthError::Database(_) | AuthError::Internal(_) | AuthError::Io(_) | AuthError::Jwt(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Internal server error".to_string(), // Don't leak details
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            remaining_seconds: remaining,
        });

        (status, body).into_response()
    }
}

/// Result type alias for auth operations
pub type AuthResult<T> = Result<T, AuthError>;
