//!
//! CAS single sign-on policy
//! -------------------------
//! Startup wiring that turns flat settings into an immutable `AuthPolicy`:
//! the typed config, the group aggregator assembled from named callbacks,
//! and the identity provider whose login/logout endpoints the flows redirect to.

use std::sync::Arc;

use tracing::info;

use crate::error::{CallbackError, ConfigError};
use crate::identity::{
    AdminAllowList, CallbackRegistry, CasConfig, CasProvider, GroupAggregator, GroupCallback, GroupSet,
    IdentityProvider, RequestContext, VerifyUser,
};
use crate::routes::{RouteResolver, StaticRoutes, LOGIN_ROUTE, LOGOUT_ROUTE};
use crate::settings::Settings;

pub mod config;
pub mod predicate;
pub mod views;

pub use config::AuthConfig;
pub use predicate::Authenticated;
pub use views::{login_view, logout_view, AuthOutcome};

/// Settings prefix for extra named routes, e.g. `jcu.routes.home = /`.
pub const ROUTES_PREFIX: &str = "jcu.routes.";

pub struct AuthPolicy {
    pub config: AuthConfig,
    pub groups: GroupAggregator,
    pub provider: Arc<dyn IdentityProvider>,
    /// Resolved single-logout endpoint (explicit setting first, then provider).
    pub sso_logout_url: Option<String>,
}

impl AuthPolicy {
    pub fn new(
        config: AuthConfig,
        callbacks: Vec<Arc<dyn GroupCallback>>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, ConfigError> {
        let sso_logout_url = config.sso_url.clone().or_else(|| provider.logout_url());
        if config.single_logout && sso_logout_url.is_none() {
            return Err(ConfigError::NoLogoutUrl);
        }
        let groups = GroupAggregator::new(callbacks).with_admins(AdminAllowList::new(config.admins.iter().cloned()));
        Ok(Self { config, groups, provider, sso_logout_url })
    }

    /// Build the policy from settings, resolving callback names against `registry`.
    pub fn from_settings(settings: &Settings, registry: &CallbackRegistry) -> Result<Self, ConfigError> {
        let config = AuthConfig::from_settings(settings)?;
        let callbacks: Vec<Arc<dyn GroupCallback>> = if config.callbacks.is_empty() {
            vec![Arc::new(VerifyUser)]
        } else {
            registry.resolve_all(&config.callbacks)?
        };
        let cas = match (&config.who_config_file, &config.cas_url) {
            (Some(path), _) => CasConfig::from_file(path)?,
            (None, Some(url)) => CasConfig::new(url.clone()),
            (None, None) => return Err(ConfigError::Missing(config::CONFIG_FILE.to_string())),
        };
        let policy = Self::new(config, callbacks, Arc::new(CasProvider::new(cas)))?;
        info!(
            target: "startup",
            "auth policy ready: return_route={}, force_ssl={}, single_logout={}, callbacks={:?}, admins={}",
            policy.config.return_route,
            policy.config.force_ssl,
            policy.config.single_logout,
            policy.groups.callback_names(),
            policy.config.admins.len()
        );
        Ok(policy)
    }

    /// Groups for the request's identity; `None` when unauthenticated.
    pub fn effective_groups(&self, ctx: &RequestContext) -> Result<Option<GroupSet>, CallbackError> {
        ctx.identity.as_ref().map(|id| self.groups.resolve(id, ctx)).transpose()
    }

    /// Route table with the login/logout routes plus every `jcu.routes.*` entry.
    /// The configured return route must be among them.
    pub fn static_routes(&self, settings: &Settings) -> Result<StaticRoutes, ConfigError> {
        let base = self.config.base_url.as_deref().unwrap_or("http://localhost:8080/");
        let mut routes = StaticRoutes::new(base)?
            .with_route(LOGIN_ROUTE, self.config.login_path.clone())
            .with_route(LOGOUT_ROUTE, self.config.logout_path.clone());
        for key in settings.keys() {
            if let Some(name) = key.strip_prefix(ROUTES_PREFIX) {
                let path = settings.require_str(key)?;
                routes = routes.with_route(name, path);
            }
        }
        if !routes.has_route(&self.config.return_route) {
            return Err(ConfigError::invalid(config::RETURN_ROUTE, &self.config.return_route, "a registered route name"));
        }
        Ok(routes)
    }
}

impl std::fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPolicy")
            .field("config", &self.config)
            .field("groups", &self.groups)
            .field("sso_logout_url", &self.sso_logout_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, ADMINISTRATOR, AUTHENTICATED};

    fn base() -> Settings {
        Settings::from_pairs([
            (config::RETURN_ROUTE, "home"),
            (config::CAS_URL, "https://cas.example.org/cas"),
            ("jcu.routes.home", "/"),
        ])
    }

    #[test]
    fn from_settings_with_cas_url() {
        let policy = AuthPolicy::from_settings(&base(), &CallbackRegistry::with_defaults()).unwrap();
        assert_eq!(policy.sso_logout_url.as_deref(), Some("https://cas.example.org/cas/logout"));
        assert_eq!(policy.groups.callback_names(), vec!["verify_user"]);
    }

    #[test]
    fn explicit_sso_url_wins() {
        let mut s = base();
        s.insert(config::SSO_URL, "https://sso.example.org/slo");
        let policy = AuthPolicy::from_settings(&s, &CallbackRegistry::new()).unwrap();
        assert_eq!(policy.sso_logout_url.as_deref(), Some("https://sso.example.org/slo"));
    }

    #[test]
    fn provider_is_required() {
        let s = Settings::from_pairs([(config::RETURN_ROUTE, "home")]);
        let err = AuthPolicy::from_settings(&s, &CallbackRegistry::new()).unwrap_err();
        assert_eq!(err, ConfigError::Missing(config::CONFIG_FILE.into()));
    }

    #[test]
    fn unknown_callback_refuses_startup() {
        let mut s = base();
        s.insert(config::AUTH_CALLBACK, "verify_user myapp.auth.Verify");
        let err = AuthPolicy::from_settings(&s, &CallbackRegistry::with_defaults()).unwrap_err();
        assert_eq!(err, ConfigError::UnknownCallback("myapp.auth.Verify".into()));
    }

    #[test]
    fn single_logout_without_endpoint_refuses_startup() {
        let mut cas = CasConfig::new("https://cas.example.org/cas");
        cas.logout_path = String::new();
        let mut cfg = AuthConfig::from_settings(&base()).unwrap();
        cfg.single_logout = true;
        let err = AuthPolicy::new(cfg, Vec::new(), Arc::new(CasProvider::new(cas))).unwrap_err();
        assert_eq!(err, ConfigError::NoLogoutUrl);
    }

    #[test]
    fn effective_groups_follow_identity() {
        let mut s = base();
        s.insert(config::ADMINS, "alice");
        let policy = AuthPolicy::from_settings(&s, &CallbackRegistry::with_defaults()).unwrap();
        assert_eq!(policy.effective_groups(&RequestContext::anonymous()).unwrap(), None);
        let groups = policy
            .effective_groups(&RequestContext::authenticated(Identity::new("alice")))
            .unwrap()
            .unwrap();
        assert_eq!(groups, GroupSet::from([AUTHENTICATED.to_string(), ADMINISTRATOR.to_string()]));
    }

    #[test]
    fn static_routes_require_return_route() {
        let policy = AuthPolicy::from_settings(&base(), &CallbackRegistry::new()).unwrap();
        let routes = policy.static_routes(&base()).unwrap();
        assert_eq!(routes.path("home"), Some("/"));
        assert_eq!(routes.path(LOGIN_ROUTE), Some("/login"));

        let mut missing = base();
        missing.insert(config::RETURN_ROUTE, "dashboard");
        let policy = AuthPolicy::from_settings(&missing, &CallbackRegistry::new()).unwrap();
        assert!(matches!(policy.static_routes(&missing), Err(ConfigError::Invalid { .. })));
    }
}
