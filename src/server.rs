//!
//! jcu-common HTTP surface
//! -----------------------
//! Axum router mounting the CAS login/logout views.
//!
//! Responsibilities:
//! - Build a `RequestContext` per request from the auth cookie, `Referer` header and query.
//! - Resolve effective groups for authenticated requests (fails closed with 500).
//! - Turn `AuthOutcome`s into redirects; a challenge becomes a redirect to the
//!   identity provider with a `service` URL that carries `return` back to login.
//! - Gate routes on authenticated state.
//! - Drop a session's pending uploads when it logs out.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Extension, Query, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::{error, info, warn};

use crate::auth::{login_view, logout_view, AuthOutcome, AuthPolicy, Authenticated};
use crate::error::{AppError, AppResult};
use crate::identity::{CallbackRegistry, MemorySessionStore, RequestContext, SessionStore, RETURN_PARAM};
use crate::ldap::LdapSettings;
use crate::routes::{RouteResolver, LOGIN_ROUTE, LOGOUT_ROUTE};
use crate::settings::Settings;
use crate::widgets::SessionUploads;

/// Shared server state injected into all handlers. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<AuthPolicy>,
    pub routes: Arc<dyn RouteResolver>,
    pub sessions: Arc<dyn SessionStore>,
    pub uploads: SessionUploads,
}

impl AppState {
    pub fn new(policy: AuthPolicy, routes: Arc<dyn RouteResolver>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { policy: Arc::new(policy), routes, sessions, uploads: SessionUploads::default() }
    }

    pub fn with_uploads(mut self, uploads: SessionUploads) -> Self {
        self.uploads = uploads;
        self
    }
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all("cookie") {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

/// Collect what the views need from the raw request and resolve groups.
pub fn request_context(
    state: &AppState,
    headers: &HeaderMap,
    query: BTreeMap<String, String>,
    route: &str,
) -> AppResult<RequestContext> {
    let session_id = parse_cookie(headers, state.sessions.cookie_name());
    let identity = session_id.as_deref().and_then(|sid| state.sessions.identity(sid));
    let referrer = headers.get("referer").and_then(|v| v.to_str().ok()).map(str::to_string);
    let request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok()).map(str::to_string);
    let remote_addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let mut ctx = RequestContext {
        identity,
        groups: None,
        referrer,
        query,
        matched_route: Some(route.to_string()),
        session_id,
        remote_addr,
        request_id,
    };
    let groups = state.policy.effective_groups(&ctx).map_err(|e| {
        error!(target: "auth", user = ctx.user_id().unwrap_or_default(), "group resolution failed: {e}");
        AppError::from(e)
    })?;
    ctx.groups = groups;
    Ok(ctx)
}

fn redirect(location: &str, extra: &[(String, String)]) -> AppResult<Response> {
    let mut headers = HeaderMap::new();
    let loc = HeaderValue::from_str(location)
        .map_err(|_| AppError::internal("bad_location".to_string(), format!("unusable redirect target: {location}")))?;
    headers.insert("location", loc);
    for (k, v) in extra {
        let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) else {
            warn!(target: "auth", header = %k, "dropping malformed response header");
            continue;
        };
        headers.append(name, value);
    }
    Ok((StatusCode::FOUND, headers).into_response())
}

fn outcome_response(state: &AppState, outcome: AuthOutcome) -> AppResult<Response> {
    match outcome {
        AuthOutcome::Redirect { location, headers } => redirect(&location, &headers),
        AuthOutcome::Challenge { return_to } => {
            // The provider sends the browser back to login carrying `return`.
            let service = state
                .routes
                .route_url(LOGIN_ROUTE, None, &[(RETURN_PARAM, return_to.as_str())])
                .ok_or_else(|| AppError::internal("unknown_route", "login route is not registered"))?;
            redirect(&state.policy.provider.challenge_url(&service), &[])
        }
    }
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> AppResult<Response> {
    let ctx = request_context(&state, &headers, query, LOGIN_ROUTE)?;
    let outcome = login_view(&state.policy, state.routes.as_ref(), &ctx)?;
    outcome_response(&state, outcome)
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> AppResult<Response> {
    let ctx = request_context(&state, &headers, query, LOGOUT_ROUTE)?;
    let outcome = logout_view(&state.policy, state.routes.as_ref(), state.sessions.as_ref(), &ctx)?;
    if let (true, Some(sid)) = (ctx.is_authenticated(), ctx.session_id.as_deref()) {
        let dropped = state.uploads.clear_session(sid);
        if dropped > 0 {
            info!(target: "auth", user = ctx.user_id().unwrap_or_default(), dropped, "pending uploads discarded");
        }
    }
    outcome_response(&state, outcome)
}

/// Who the current request is authenticated as, with effective groups.
async fn whoami(Extension(ctx): Extension<RequestContext>) -> AppResult<Response> {
    let identity = ctx.identity.as_ref();
    let body = serde_json::json!({
        "status": "ok",
        "user_id": ctx.user_id(),
        "display_name": identity.and_then(|i| i.display_name()),
        "groups": ctx.groups,
    });
    Ok(Json(body).into_response())
}

/// Middleware: only let authenticated requests through. The resolved context
/// is handed to the handler as a request extension.
pub async fn require_authenticated(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let route = request.uri().path().to_string();
    let ctx = match request_context(&state, request.headers(), BTreeMap::new(), &route) {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };
    if !Authenticated(true).matches(&ctx) {
        return AppError::auth("unauthenticated", "login required").into_response();
    }
    request.extensions_mut().insert(ctx);
    next.run(request).await
}

/// Router with login/logout mounted at the configured paths and a gated `/whoami`.
pub fn build_router(state: AppState) -> Router {
    let login_path = state.policy.config.login_path.clone();
    let logout_path = state.policy.config.logout_path.clone();
    let gated = Router::new()
        .route("/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_authenticated));
    Router::new()
        .route("/", get(|| async { "jcu-common ok" }))
        .route(&login_path, get(login))
        .route(&logout_path, get(logout))
        .merge(gated)
        .with_state(state)
}

/// Validate every configuration section and assemble the server state.
/// Any configuration error aborts startup.
pub fn build_state(settings: &Settings, registry: &CallbackRegistry) -> anyhow::Result<AppState> {
    let policy = AuthPolicy::from_settings(settings, registry).context("while building auth policy")?;
    let routes = policy.static_routes(settings).context("while building route table")?;
    LdapSettings::from_settings(settings).context("while reading LDAP settings")?;
    Ok(AppState::new(policy, Arc::new(routes), Arc::new(MemorySessionStore::default())))
}

/// Serve with the default callback registry.
pub async fn run_with_settings(settings: Settings, http_port: u16) -> anyhow::Result<()> {
    run_with_registry(settings, &CallbackRegistry::with_defaults(), http_port).await
}

/// Serve with host-provided group callbacks (e.g. `CallbackRegistry::with_ldap`).
pub async fn run_with_registry(settings: Settings, registry: &CallbackRegistry, http_port: u16) -> anyhow::Result<()> {
    let app = build_router(build_state(&settings, registry)?);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("while binding {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
