//! Typed auth configuration built once from `Settings` at startup.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::settings::{as_bool, as_list, Coercer, Settings};

pub const RETURN_ROUTE: &str = "jcu.auth.return_route";
pub const AUTH_CALLBACK: &str = "jcu.auth.auth_callback";
pub const CONFIG_FILE: &str = "jcu.auth.who_config_file";
pub const CAS_URL: &str = "jcu.auth.cas_url";
pub const SSO_URL: &str = "jcu.auth.sso_url";
pub const SINGLE_LOGOUT: &str = "jcu.auth.single_logout";
pub const FORCE_SSL: &str = "jcu.auth.force_ssl";
pub const ADMINS: &str = "jcu.auth.admins";
pub const BASE_URL: &str = "jcu.auth.base_url";
pub const LOGIN_PATH: &str = "jcu.auth.login_path";
pub const LOGOUT_PATH: &str = "jcu.auth.logout_path";

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_LOGOUT_PATH: &str = "/logout";

pub fn coercions() -> Vec<(&'static str, Coercer)> {
    vec![
        (FORCE_SSL, as_bool as Coercer),
        (SINGLE_LOGOUT, as_bool as Coercer),
        (AUTH_CALLBACK, as_list as Coercer),
        (ADMINS, as_list as Coercer),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub return_route: String,
    pub force_ssl: bool,
    pub single_logout: bool,
    /// Explicit single-logout URL; otherwise the identity provider's is used.
    pub sso_url: Option<String>,
    pub callbacks: Vec<String>,
    pub admins: BTreeSet<String>,
    pub who_config_file: Option<PathBuf>,
    pub cas_url: Option<String>,
    pub login_path: String,
    pub logout_path: String,
    pub base_url: Option<String>,
}

impl AuthConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let s = settings.coerce(&coercions())?;
        let opt = |key: &str| s.get_str(key).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        Ok(Self {
            return_route: s.require_str(RETURN_ROUTE)?.trim().to_string(),
            force_ssl: s.bool_or(FORCE_SSL, false)?,
            single_logout: s.bool_or(SINGLE_LOGOUT, false)?,
            sso_url: opt(SSO_URL),
            callbacks: s.list(AUTH_CALLBACK)?,
            admins: s.list(ADMINS)?.into_iter().collect(),
            who_config_file: opt(CONFIG_FILE).map(PathBuf::from),
            cas_url: opt(CAS_URL),
            login_path: opt(LOGIN_PATH).unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
            logout_path: opt(LOGOUT_PATH).unwrap_or_else(|| DEFAULT_LOGOUT_PATH.to_string()),
            base_url: opt(BASE_URL),
        })
    }

    /// Rewrites an `http://` URL to `https://` when force-SSL is on; other URLs pass through.
    pub fn force_https(&self, url: &str) -> String {
        match url.strip_prefix("http://") {
            Some(rest) if self.force_ssl => format!("https://{rest}"),
            _ => url.to_string(),
        }
    }

    pub fn return_scheme(&self) -> Option<&'static str> { self.force_ssl.then_some("https") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let cfg = AuthConfig::from_settings(&Settings::from_pairs([(RETURN_ROUTE, "home")])).unwrap();
        assert_eq!(cfg.return_route, "home");
        assert!(!cfg.force_ssl);
        assert!(!cfg.single_logout);
        assert!(cfg.callbacks.is_empty());
        assert!(cfg.admins.is_empty());
        assert_eq!(cfg.login_path, "/login");
        assert_eq!(cfg.logout_path, "/logout");
    }

    #[test]
    fn return_route_is_required() {
        let err = AuthConfig::from_settings(&Settings::from_pairs([(FORCE_SSL, "true")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(RETURN_ROUTE.into()));
    }

    #[test]
    fn typed_values_are_parsed() {
        let cfg = AuthConfig::from_settings(&Settings::from_pairs([
            (RETURN_ROUTE, "home"),
            (FORCE_SSL, "on"),
            (SINGLE_LOGOUT, "false"),
            (AUTH_CALLBACK, "verify_user ldap_roles"),
            (ADMINS, "alice bob"),
            (LOGIN_PATH, "/auth/login"),
        ]))
        .unwrap();
        assert!(cfg.force_ssl);
        assert_eq!(cfg.callbacks, vec!["verify_user".to_string(), "ldap_roles".to_string()]);
        assert!(cfg.admins.contains("alice") && cfg.admins.contains("bob"));
        assert_eq!(cfg.login_path, "/auth/login");
    }

    #[test]
    fn force_https_rewrites_only_when_forced() {
        let mut cfg = AuthConfig::from_settings(&Settings::from_pairs([(RETURN_ROUTE, "home")])).unwrap();
        assert_eq!(cfg.force_https("http://example.org/page"), "http://example.org/page");
        cfg.force_ssl = true;
        assert_eq!(cfg.force_https("http://example.org/page"), "https://example.org/page");
        assert_eq!(cfg.force_https("https://example.org/page"), "https://example.org/page");
        assert_eq!(cfg.force_https(""), "");
    }
}
