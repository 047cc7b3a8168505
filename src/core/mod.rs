// Core domain layer
pub mod interfaces;
pub mod models;
pub mod protocol;
pub mod services;

pub use interfaces::*;
pub use models::*;
pub use protocol::*;
pub use services::*;
