pub mod auth;
pub mod error;
pub mod identity;
pub mod json;
pub mod ldap;
pub mod routes;
pub mod server;
pub mod settings;
pub mod widgets;

pub use error::{AppError, AppResult, ConfigError};
pub use settings::Settings;
