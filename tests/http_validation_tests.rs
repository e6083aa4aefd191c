//! HTTP surface tests: request validation, auth extraction, and the
//! undifferentiated 401 contract, exercised through the full router with
//! `tower::ServiceExt::oneshot`.
//!
//! Every request here is rejected before any backing store is touched, so
//! the stores are stubs that fail loudly if reached.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use courier_server::config::JwtSettings;
use courier_server::error::{ApiError, Result};
use courier_server::models::{Device, DeviceDescriptor, Session, User};
use courier_server::presence::PresenceRegistry;
use courier_server::routes::build_router;
use courier_server::security::jwt::TokenService;
use courier_server::services::AuthService;
use courier_server::store::{
    DeviceRegistry, OtpVerifier, RevocationLedger, SessionStore, UserStore,
};
use courier_server::AppState;

/// Stub backing store. Every method errors: the requests in this file must
/// be rejected at the HTTP or credential layer, before any store call.
struct UntouchedStores;

fn untouched<T>() -> Result<T> {
    Err(ApiError::Internal(
        "backing store reached in a validation-only test".to_string(),
    ))
}

#[async_trait]
impl UserStore for UntouchedStores {
    async fn find_by_phone(&self, _phone_number: &str) -> Result<Option<User>> {
        untouched()
    }
    async fn create_from_phone(&self, _phone_number: &str) -> Result<User> {
        untouched()
    }
    async fn record_login(&self, _user_id: Uuid) -> Result<()> {
        untouched()
    }
    async fn find_by_id(&self, _user_id: Uuid) -> Result<Option<User>> {
        untouched()
    }
    async fn update_last_seen(&self, _user_id: Uuid, _at: DateTime<Utc>) -> Result<()> {
        untouched()
    }
}

#[async_trait]
impl DeviceRegistry for UntouchedStores {
    async fn find(&self, _user_id: Uuid, _device_id: &str) -> Result<Option<Device>> {
        untouched()
    }
    async fn find_primary(&self, _user_id: Uuid) -> Result<Option<Device>> {
        untouched()
    }
    async fn upsert_primary(
        &self,
        _user_id: Uuid,
        _descriptor: &DeviceDescriptor,
    ) -> Result<Device> {
        untouched()
    }
    async fn demote_primary(&self, _user_id: Uuid, _device_id: &str) -> Result<()> {
        untouched()
    }
    async fn deactivate(&self, _user_id: Uuid, _device_id: &str) -> Result<()> {
        untouched()
    }
}

#[async_trait]
impl SessionStore for UntouchedStores {
    async fn revoke_all_for_device(
        &self,
        _user_id: Uuid,
        _device_id: &str,
    ) -> Result<Vec<(String, DateTime<Utc>)>> {
        untouched()
    }
    async fn create(
        &self,
        _user_id: Uuid,
        _device_id: &str,
        _fingerprint: &str,
        _expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        untouched()
    }
    async fn rotate(
        &self,
        _user_id: Uuid,
        _device_id: &str,
        _presented_fp: &str,
        _next_fp: &str,
        _next_expiry: DateTime<Utc>,
    ) -> Result<bool> {
        untouched()
    }
    async fn find(&self, _user_id: Uuid, _device_id: &str) -> Result<Option<Session>> {
        untouched()
    }
}

#[async_trait]
impl RevocationLedger for UntouchedStores {
    async fn insert(&self, _fingerprint: &str, _expires_at: DateTime<Utc>) -> Result<()> {
        untouched()
    }
    async fn contains(&self, _fingerprint: &str) -> Result<bool> {
        untouched()
    }
}

/// Accepts exactly "123456"; everything else is a wrong code.
struct FixedCodeVerifier;

#[async_trait]
impl OtpVerifier for FixedCodeVerifier {
    async fn send(&self, _phone_number: &str) -> Result<u32> {
        Ok(300)
    }
    async fn check(&self, _phone_number: &str, code: &str) -> Result<bool> {
        Ok(code == "123456")
    }
}

fn test_app() -> axum::Router {
    let stores = Arc::new(UntouchedStores);
    let auth = AuthService::new(
        stores.clone(),
        stores.clone(),
        stores.clone(),
        stores,
        Arc::new(FixedCodeVerifier),
        TokenService::new(&JwtSettings {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 2_592_000,
        }),
    );

    build_router(AppState {
        auth,
        presence: PresenceRegistry::new(),
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_send_otp_rejects_malformed_phone() {
    let app = test_app();

    let response = app
        .oneshot(post_json(
            "/auth/send-otp",
            json!({ "phoneNumber": "not-a-phone" }),
        ))
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_otp_wrong_code_is_generic_401() {
    let app = test_app();

    let response = app
        .oneshot(post_json(
            "/auth/verify-otp",
            json!({
                "phoneNumber": "+15551234567",
                "otp": "000000",
                "device": {
                    "deviceId": "device-aaa-111",
                    "platform": "ios",
                    "deviceName": "iPhone 15"
                }
            }),
        ))
        .await
        .expect("request should complete");

    // A wrong code and a revoked token look identical from outside.
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");
}

#[tokio::test]
async fn test_verify_otp_rejects_short_code() {
    let app = test_app();

    let response = app
        .oneshot(post_json(
            "/auth/verify-otp",
            json!({
                "phoneNumber": "+15551234567",
                "otp": "12",
                "device": {
                    "deviceId": "device-aaa-111",
                    "platform": "ios",
                    "deviceName": "iPhone 15"
                }
            }),
        ))
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_with_garbage_token_is_generic_401() {
    let app = test_app();

    let response = app
        .oneshot(post_json(
            "/auth/refresh-token",
            json!({ "refreshToken": "not.a.jwt" }),
        ))
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");
}

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_rejects_refresh_token_as_bearer() {
    let app = test_app();
    let tokens = TokenService::new(&JwtSettings {
        access_secret: "test-access-secret".to_string(),
        refresh_secret: "test-refresh-secret".to_string(),
        access_ttl_secs: 900,
        refresh_ttl_secs: 2_592_000,
    });
    let refresh = tokens
        .issue_refresh(Uuid::new_v4(), "device-aaa-111")
        .expect("token should issue");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {refresh}"))
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_requires_bearer_token() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/password-reset")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
