/// Authentication handlers
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::error::Result;
use crate::middleware::AuthUser;
use crate::models::device::DeviceDescriptor;
use crate::models::user::UserProfile;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    #[validate(custom(function = "crate::validators::e164_shape_validator"))]
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpResponse {
    pub success: bool,
    pub message: String,
    pub expires_in: u32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[validate(custom(function = "crate::validators::e164_shape_validator"))]
    pub phone_number: String,
    #[validate(custom(function = "crate::validators::otp_shape_validator"))]
    pub otp: String,
    #[validate(nested)]
    pub device: DeviceDescriptor,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    pub is_new_user: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>> {
    payload.validate()?;
    let expires_in = state.auth.send_code(&payload.phone_number).await?;

    Ok(Json(SendOtpResponse {
        success: true,
        message: "Verification code sent".to_string(),
        expires_in,
    }))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpResponse>> {
    payload.validate()?;
    let login = state
        .auth
        .verify_code(&payload.phone_number, &payload.otp, &payload.device)
        .await?;

    Ok(Json(VerifyOtpResponse {
        user: login.user,
        access_token: login.access_token,
        refresh_token: login.refresh_token,
        is_new_user: login.is_new_user,
    }))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>> {
    let rotated = state.auth.refresh(&payload.refresh_token).await?;

    Ok(Json(RefreshResponse {
        access_token: rotated.access_token,
        refresh_token: rotated.refresh_token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>> {
    state.auth.logout(auth.user_id, &auth.device_id).await?;

    Ok(Json(json!({ "success": true, "message": "Logged out" })))
}

pub async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UserProfile>> {
    let profile = state.auth.me(auth.user_id).await?;
    Ok(Json(profile))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
