use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use courier_server::config::Settings;
use courier_server::db::{PgDeviceRegistry, PgSessionStore, PgUserStore};
use courier_server::presence::PresenceRegistry;
use courier_server::routes::build_router;
use courier_server::security::jwt::TokenService;
use courier_server::security::ledger::RedisRevocationLedger;
use courier_server::services::{AuthService, DevOtpVerifier, TwilioVerifier};
use courier_server::store::OtpVerifier;
use courier_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_server=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout_secs))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations applied");

    let redis_client =
        redis::Client::open(settings.redis.url.as_str()).context("Invalid REDIS_URL")?;
    let redis = Arc::new(Mutex::new(
        ConnectionManager::new(redis_client)
            .await
            .context("Failed to connect to Redis")?,
    ));

    let tokens = TokenService::new(&settings.jwt);

    let otp: Arc<dyn OtpVerifier> = if settings.twilio.is_configured() {
        info!("Using Twilio Verify for OTP delivery");
        Arc::new(TwilioVerifier::new(
            settings.twilio.account_sid.clone().unwrap_or_default(),
            settings.twilio.auth_token.clone().unwrap_or_default(),
            settings
                .twilio
                .verify_service_sid
                .clone()
                .unwrap_or_default(),
            redis.clone(),
        ))
    } else {
        info!("Twilio not configured, using development OTP verifier");
        Arc::new(DevOtpVerifier::new(redis.clone()))
    };

    let auth = AuthService::new(
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgDeviceRegistry::new(pool.clone())),
        Arc::new(PgSessionStore::new(pool.clone())),
        Arc::new(RedisRevocationLedger::new(redis.clone())),
        otp,
        tokens,
    );

    let state = AppState {
        auth,
        presence: PresenceRegistry::new(),
    };

    let app = build_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
