//! Login and logout flows.
//!
//! Both views are pure decisions over a `RequestContext`: they never render,
//! they return an `AuthOutcome` the HTTP layer turns into a response.

use tracing::info;

use crate::error::{AppError, AppResult};
use crate::identity::{RequestContext, SessionStore, RETURN_PARAM};
use crate::routes::{RouteResolver, LOGOUT_ROUTE};

use super::AuthPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Ask the identity provider to authenticate, then come back with `return_to`.
    Challenge { return_to: String },
    Redirect { location: String, headers: Vec<(String, String)> },
}

impl AuthOutcome {
    fn redirect(location: String) -> Self { AuthOutcome::Redirect { location, headers: Vec::new() } }

    pub fn location(&self) -> Option<&str> {
        match self {
            AuthOutcome::Redirect { location, .. } => Some(location),
            AuthOutcome::Challenge { .. } => None,
        }
    }
}

fn route_url(routes: &dyn RouteResolver, name: &str, scheme: Option<&str>, query: &[(&str, &str)]) -> AppResult<String> {
    routes
        .route_url(name, scheme, query)
        .ok_or_else(|| AppError::internal("unknown_route".to_string(), format!("route `{name}` is not registered")))
}

/// `return` query parameter, or the configured return route.
fn return_url(policy: &AuthPolicy, routes: &dyn RouteResolver, ctx: &RequestContext) -> AppResult<String> {
    match ctx.return_param() {
        Some(r) => Ok(r.to_string()),
        None => route_url(routes, &policy.config.return_route, policy.config.return_scheme(), &[]),
    }
}

pub fn login_view(policy: &AuthPolicy, routes: &dyn RouteResolver, ctx: &RequestContext) -> AppResult<AuthOutcome> {
    if !ctx.is_authenticated() {
        let return_to = policy.config.force_https(ctx.referrer_or_empty());
        info!(target: "auth", return_to = %return_to, "login challenge");
        return Ok(AuthOutcome::Challenge { return_to });
    }
    let location = return_url(policy, routes, ctx)?;
    info!(target: "auth", user = ctx.user_id().unwrap_or_default(), location = %location, "login redirect");
    Ok(AuthOutcome::redirect(location))
}

pub fn logout_view(
    policy: &AuthPolicy,
    routes: &dyn RouteResolver,
    sessions: &dyn SessionStore,
    ctx: &RequestContext,
) -> AppResult<AuthOutcome> {
    if ctx.is_authenticated() {
        // Come back here once the credentials are gone.
        let route = ctx.matched_route.as_deref().unwrap_or(LOGOUT_ROUTE);
        let here = route_url(routes, route, None, &[(RETURN_PARAM, ctx.referrer_or_empty())])?;
        if let Some(sid) = ctx.session_id.as_deref() {
            sessions.invalidate(sid);
        }
        info!(target: "auth", user = ctx.user_id().unwrap_or_default(), "logged out locally");
        return Ok(AuthOutcome::Redirect { location: here, headers: sessions.forget_headers() });
    }

    let return_to = return_url(policy, routes, ctx)?;
    let location = match (policy.config.single_logout, policy.sso_logout_url.as_deref()) {
        (true, Some(sso)) => format!("{}?url={}", sso, urlencoding::encode(&return_to)),
        _ => return_to,
    };
    info!(target: "auth", location = %location, "logout redirect");
    Ok(AuthOutcome::redirect(location))
}
