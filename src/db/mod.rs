/// Postgres store implementations
pub mod devices;
pub mod sessions;
pub mod users;

pub use devices::PgDeviceRegistry;
pub use sessions::PgSessionStore;
pub use users::PgUserStore;
