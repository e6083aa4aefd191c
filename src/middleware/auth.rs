/// JWT authentication extractor
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;
use crate::security::jwt::TokenKind;
use crate::state::AppState;

/// Caller identity extracted from a bearer access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub device_id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::InvalidToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::InvalidToken)?;

        let claims = state.auth.tokens().verify(token, TokenKind::Access)?;
        let user_id = claims.user_id()?;

        Ok(AuthUser {
            user_id,
            device_id: claims.device_id,
        })
    }
}
