/// Courier server library
///
/// Backend core for a phone-number messaging app: OTP login, multi-device
/// session management with refresh-token rotation, and in-process presence
/// tracking over WebSocket.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Postgres repositories (users, devices, sessions)
/// - `error`: Error types
/// - `handlers`: REST handlers
/// - `models`: Data models
/// - `presence`: Connection registry and WebSocket route
/// - `security`: JWT issuance/verification, revocation ledger
/// - `services`: Business logic (auth orchestration, OTP delivery)
/// - `store`: Capability traits for backing stores
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod presence;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;
pub mod store;
pub mod validators;


pub use error::{ApiError, Result};
pub use state::AppState;

use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;
