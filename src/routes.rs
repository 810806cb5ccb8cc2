//! Route-name → absolute URL resolution.

use std::collections::BTreeMap;

use url::Url;

use crate::error::ConfigError;

pub const LOGIN_ROUTE: &str = "auth-login";
pub const LOGOUT_ROUTE: &str = "auth-logout";

pub trait RouteResolver: Send + Sync {
    /// Absolute URL for `name`, optionally forcing `scheme`, with `query` appended.
    /// `None` when the route is unknown.
    fn route_url(&self, name: &str, scheme: Option<&str>, query: &[(&str, &str)]) -> Option<String>;

    fn has_route(&self, name: &str) -> bool { self.route_url(name, None, &[]).is_some() }
}

/// Fixed route table rooted at the application's public base URL.
#[derive(Debug, Clone)]
pub struct StaticRoutes {
    base: Url,
    routes: BTreeMap<String, String>,
}

impl StaticRoutes {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base = Url::parse(base_url).map_err(|_| ConfigError::invalid("jcu.auth.base_url", base_url, "an absolute URL"))?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::invalid("jcu.auth.base_url", base_url, "an absolute URL"));
        }
        Ok(Self { base, routes: BTreeMap::new() })
    }

    pub fn with_route(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.routes.insert(name.into(), path.into());
        self
    }

    pub fn path(&self, name: &str) -> Option<&str> { self.routes.get(name).map(|s| s.as_str()) }
}

impl RouteResolver for StaticRoutes {
    fn route_url(&self, name: &str, scheme: Option<&str>, query: &[(&str, &str)]) -> Option<String> {
        let path = self.routes.get(name)?;
        let mut url = self.base.join(path).ok()?;
        if let Some(s) = scheme {
            url.set_scheme(s).ok()?;
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Some(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> StaticRoutes {
        StaticRoutes::new("http://app.example.org/")
            .unwrap()
            .with_route("home", "/")
            .with_route(LOGOUT_ROUTE, "/logout")
    }

    #[test]
    fn resolves_known_routes() {
        let r = routes();
        assert_eq!(r.route_url("home", None, &[]).as_deref(), Some("http://app.example.org/"));
        assert_eq!(r.route_url("home", Some("https"), &[]).as_deref(), Some("https://app.example.org/"));
        assert!(r.has_route(LOGOUT_ROUTE));
        assert!(!r.has_route("nope"));
    }

    #[test]
    fn query_values_are_encoded() {
        let url = routes()
            .route_url(LOGOUT_ROUTE, None, &[("return", "http://example.org/page?a=1")])
            .unwrap();
        assert_eq!(url, "http://app.example.org/logout?return=http%3A%2F%2Fexample.org%2Fpage%3Fa%3D1");
        let parsed = Url::parse(&url).unwrap();
        let (_, v) = parsed.query_pairs().find(|(k, _)| k == "return").unwrap();
        assert_eq!(v, "http://example.org/page?a=1");
    }

    #[test]
    fn empty_query_value_is_kept() {
        let url = routes().route_url(LOGOUT_ROUTE, None, &[("return", "")]).unwrap();
        assert_eq!(url, "http://app.example.org/logout?return=");
    }

    #[test]
    fn relative_base_is_rejected() {
        assert!(StaticRoutes::new("/just/a/path").is_err());
    }
}
