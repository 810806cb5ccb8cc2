use std::collections::BTreeMap;

use super::groups::GroupSet;
use super::Identity;

/// Query parameter carrying the post-authentication destination.
pub const RETURN_PARAM: &str = "return";

/// What the auth flows need to know about one inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
    /// Effective groups, computed once identity lookup succeeded.
    pub groups: Option<GroupSet>,
    pub referrer: Option<String>,
    pub query: BTreeMap<String, String>,
    pub matched_route: Option<String>,
    pub session_id: Option<String>,
    pub remote_addr: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self { Self::default() }

    pub fn authenticated(identity: Identity) -> Self {
        Self { identity: Some(identity), ..Default::default() }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.matched_route = Some(route.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_authenticated(&self) -> bool { self.identity.is_some() }

    pub fn user_id(&self) -> Option<&str> { self.identity.as_ref().map(|i| i.user_id.as_str()) }

    /// Non-empty `return` query value; `return=` counts as absent.
    pub fn return_param(&self) -> Option<&str> {
        self.query.get(RETURN_PARAM).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }

    /// Referrer or the empty string when the client sent none.
    pub fn referrer_or_empty(&self) -> &str { self.referrer.as_deref().unwrap_or("") }
}
