use crate::presence::PresenceRegistry;
use crate::services::AuthService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub presence: PresenceRegistry,
}
