/// Business logic services
pub mod auth;
pub mod otp;

pub use auth::{AuthService, LoginResult, RefreshResult};
pub use otp::{DevOtpVerifier, TwilioVerifier};
