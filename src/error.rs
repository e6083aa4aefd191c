use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid or expired verification code")]
    InvalidOtp,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Wrong token kind")]
    WrongTokenKind,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Refresh token reuse detected")]
    ReuseDetected,

    #[error("User not found")]
    UserNotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests: {0}")]
    RateLimited(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Verification provider error: {0}")]
    OtpProvider(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// True for every failure that must surface as an undifferentiated 401.
    ///
    /// Expired vs. malformed vs. revoked vs. reused is logged internally but
    /// never exposed to the caller.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidOtp
                | ApiError::InvalidToken
                | ApiError::TokenExpired
                | ApiError::WrongTokenKind
                | ApiError::TokenRevoked
                | ApiError::ReuseDetected
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = if self.is_credential_failure() {
            tracing::warn!(error = %self, "Credential failure");
            (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
        } else {
            match self {
                ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
                ApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
                ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
                ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
                ApiError::Database(msg) | ApiError::Redis(msg) | ApiError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
                ApiError::OtpProvider(msg) => {
                    tracing::error!(error = %msg, "Verification provider error");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Verification service unavailable".to_string(),
                    )
                }
                _ => unreachable!("credential failures handled above"),
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        // A losing racer on a unique constraint (e.g. two promotions
        // hitting the one-primary-per-user partial index) is a conflict
        // for the caller to retry, not a server fault.
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                tracing::warn!("Unique constraint violation: {}", db.message());
                return ApiError::Conflict("Resource already exists".to_string());
            }
        }
        tracing::error!("Database error: {}", err);
        ApiError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for ApiError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        ApiError::Redis(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::TokenExpired,
            _ => ApiError::InvalidToken,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}
