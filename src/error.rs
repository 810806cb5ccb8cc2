//! Unified application error model and mapping helpers.
//! `AppError` is what HTTP handlers return; the narrower `ConfigError`,
//! `CallbackError` and `WidgetError` come out of startup, group resolution and
//! form widgets respectively and convert into it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Auth { code: String, message: String },
    Config { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Config { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Config { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Config { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config { code: "config_error".into(), message: err.to_string() }
    }
}

// Group resolution failures fail the request closed: no partial group set is ever applied.
impl From<CallbackError> for AppError {
    fn from(err: CallbackError) -> Self {
        AppError::Internal { code: "group_callback_failed".into(), message: err.to_string() }
    }
}

impl From<WidgetError> for AppError {
    fn from(err: WidgetError) -> Self {
        match err {
            WidgetError::Invalid(message) => AppError::UserInput { code: "invalid".into(), message },
            WidgetError::NoSession => AppError::Auth { code: "no_session".into(), message: err.to_string() },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "error": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

/// Startup configuration problems. Any of these aborts startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(String),
    #[error("setting `{key}` has invalid value `{value}`: expected {expected}")]
    Invalid { key: String, value: String, expected: &'static str },
    #[error("unknown group callback `{0}`")]
    UnknownCallback(String),
    #[error("single logout is enabled but the identity provider exposes no logout URL")]
    NoLogoutUrl,
    #[error("cannot load {path}: {reason}")]
    File { path: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &str, value: impl Display, expected: &'static str) -> Self {
        ConfigError::Invalid { key: key.to_string(), value: value.to_string(), expected }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("group callback `{callback}` failed: {reason}")]
    Failed { callback: String, reason: String },
}

impl CallbackError {
    pub fn failed(callback: impl Into<String>, reason: impl Display) -> Self {
        CallbackError::Failed { callback: callback.into(), reason: reason.to_string() }
    }
}

/// Form widget validation failures. `Invalid` carries the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WidgetError {
    #[error("{0}")]
    Invalid(String),
    #[error("request carries no session")]
    NoSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
        assert_eq!(AppError::from(ConfigError::Missing("jcu.auth.return_route".into())).http_status(), 500);
        assert_eq!(AppError::from(WidgetError::NoSession).http_status(), 401);
    }

    #[test]
    fn callback_errors_map_to_server_error() {
        let err: AppError = CallbackError::failed("ldap_roles", "server down").into();
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.code_str(), "group_callback_failed");
        assert!(err.message().contains("ldap_roles"));
    }

    #[test]
    fn widget_errors_keep_user_message() {
        let err: AppError = WidgetError::Invalid("Challenge data was missing.".into()).into();
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.message(), "Challenge data was missing.");
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::invalid("jcu.auth.force_ssl", "maybe", "a boolean");
        assert_eq!(
            err.to_string(),
            "setting `jcu.auth.force_ssl` has invalid value `maybe`: expected a boolean"
        );
    }
}
