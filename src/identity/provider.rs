use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// External identity provider. The CAS ticket exchange itself happens outside
/// this crate; only the redirect targets are produced here.
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser when a challenge is issued. `service_url` is
    /// the URL the provider returns to once the user signed in.
    fn challenge_url(&self, service_url: &str) -> String;

    /// Single-logout endpoint, when the provider offers one.
    fn logout_url(&self) -> Option<String>;
}

fn default_login_path() -> String { "login".to_string() }
fn default_logout_path() -> String { "logout".to_string() }

/// Identity-provider config file contents (`jcu.auth.who_config_file`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CasConfig {
    pub cas_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
}

impl CasConfig {
    pub fn new(cas_url: impl Into<String>) -> Self {
        Self { cas_url: cas_url.into(), login_path: default_login_path(), logout_path: default_logout_path() }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File { path: path.display().to_string(), reason: e.to_string() })?;
        let cfg: CasConfig = serde_json::from_str(&text)
            .map_err(|e| ConfigError::File { path: path.display().to_string(), reason: e.to_string() })?;
        if cfg.cas_url.trim().is_empty() {
            return Err(ConfigError::Missing("cas_url".into()));
        }
        Ok(cfg)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cas_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct CasProvider {
    config: CasConfig,
}

impl CasProvider {
    pub fn new(config: CasConfig) -> Self { Self { config } }
}

impl IdentityProvider for CasProvider {
    fn challenge_url(&self, service_url: &str) -> String {
        format!("{}?service={}", self.config.endpoint(&self.config.login_path), urlencoding::encode(service_url))
    }

    fn logout_url(&self) -> Option<String> {
        if self.config.logout_path.is_empty() {
            return None;
        }
        Some(self.config.endpoint(&self.config.logout_path))
    }
}
