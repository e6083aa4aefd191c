pub mod device;
pub mod session;
pub mod user;

pub use device::{Device, DeviceDescriptor};
pub use session::Session;
pub use user::{User, UserProfile};
