//! Group callbacks and their aggregation into one effective group set.
//!
//! Every authenticated identity carries `authenticated`. `administrator` is decided
//! by the configured allow-list alone; a callback cannot grant it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::{CallbackError, ConfigError};

use super::{Identity, RequestContext};

pub const AUTHENTICATED: &str = "authenticated";
pub const ADMINISTRATOR: &str = "administrator";

pub type GroupSet = BTreeSet<String>;

/// Maps an identity to extra group memberships. `Ok(None)` contributes nothing.
pub trait GroupCallback: Send + Sync {
    fn name(&self) -> &str;
    fn groups(&self, identity: &Identity, request: &RequestContext) -> Result<Option<GroupSet>, CallbackError>;
}

/// Default callback: grants no extra groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyUser;

impl GroupCallback for VerifyUser {
    fn name(&self) -> &str { "verify_user" }

    fn groups(&self, _identity: &Identity, _request: &RequestContext) -> Result<Option<GroupSet>, CallbackError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    admins: BTreeSet<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { admins: admins.into_iter().map(Into::into).collect() }
    }

    pub fn contains(&self, user_id: &str) -> bool { self.admins.contains(user_id) }
}

impl GroupCallback for AdminAllowList {
    fn name(&self) -> &str { "admin_allow_list" }

    fn groups(&self, identity: &Identity, _request: &RequestContext) -> Result<Option<GroupSet>, CallbackError> {
        Ok(self.contains(&identity.user_id).then(|| GroupSet::from([ADMINISTRATOR.to_string()])))
    }
}

/// Runs every configured callback and unions the results with `authenticated`.
#[derive(Clone, Default)]
pub struct GroupAggregator {
    callbacks: Vec<Arc<dyn GroupCallback>>,
    admins: AdminAllowList,
}

impl GroupAggregator {
    pub fn new(callbacks: Vec<Arc<dyn GroupCallback>>) -> Self {
        Self { callbacks, admins: AdminAllowList::default() }
    }

    pub fn with_admins(mut self, admins: AdminAllowList) -> Self {
        self.admins = admins;
        self
    }

    pub fn callback_names(&self) -> Vec<&str> { self.callbacks.iter().map(|c| c.name()).collect() }

    /// Fails fast: the first callback error aborts resolution and no partial set is returned.
    pub fn resolve(&self, identity: &Identity, request: &RequestContext) -> Result<GroupSet, CallbackError> {
        let mut out = GroupSet::new();
        out.insert(AUTHENTICATED.to_string());
        for cb in &self.callbacks {
            if let Some(extra) = cb.groups(identity, request)? {
                out.extend(extra);
            }
        }
        out.remove(ADMINISTRATOR);
        if let Some(admin) = self.admins.groups(identity, request)? {
            out.extend(admin);
        }
        debug!(target: "auth", user = %identity.user_id, groups = ?out, "groups resolved");
        Ok(out)
    }
}

impl std::fmt::Debug for GroupAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupAggregator")
            .field("callbacks", &self.callback_names())
            .field("admins", &self.admins)
            .finish()
    }
}

/// Named callbacks available to the `jcu.auth.auth_callback` setting.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    entries: BTreeMap<String, Arc<dyn GroupCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self { Self::default() }

    /// Registry holding the no-op `verify_user` callback.
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        r.register("verify_user", Arc::new(VerifyUser));
        r
    }

    pub fn register(&mut self, name: impl Into<String>, callback: Arc<dyn GroupCallback>) -> &mut Self {
        self.entries.insert(name.into(), callback);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn GroupCallback>, ConfigError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCallback(name.to_string()))
    }

    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn GroupCallback>>, ConfigError> {
        names.iter().map(|n| self.resolve(n.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, &'static [&'static str]);

    impl GroupCallback for Fixed {
        fn name(&self) -> &str { self.0 }
        fn groups(&self, _: &Identity, _: &RequestContext) -> Result<Option<GroupSet>, CallbackError> {
            Ok(Some(self.1.iter().map(|s| s.to_string()).collect()))
        }
    }

    struct Broken;

    impl GroupCallback for Broken {
        fn name(&self) -> &str { "broken" }
        fn groups(&self, _: &Identity, _: &RequestContext) -> Result<Option<GroupSet>, CallbackError> {
            Err(CallbackError::failed("broken", "directory unavailable"))
        }
    }

    fn set(items: &[&str]) -> GroupSet { items.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn no_callbacks_yields_authenticated_only() {
        let agg = GroupAggregator::default();
        let groups = agg.resolve(&Identity::new("bob"), &RequestContext::anonymous()).unwrap();
        assert_eq!(groups, set(&[AUTHENTICATED]));
    }

    #[test]
    fn admin_allow_list_grants_administrator() {
        let agg = GroupAggregator::new(vec![Arc::new(VerifyUser)]).with_admins(AdminAllowList::new(["alice"]));
        let ctx = RequestContext::anonymous();
        assert_eq!(agg.resolve(&Identity::new("alice"), &ctx).unwrap(), set(&[AUTHENTICATED, ADMINISTRATOR]));
        assert_eq!(agg.resolve(&Identity::new("bob"), &ctx).unwrap(), set(&[AUTHENTICATED]));
    }

    #[test]
    fn union_ignores_order_and_duplicates() {
        let a: Arc<dyn GroupCallback> = Arc::new(Fixed("a", &["staff", "library"]));
        let b: Arc<dyn GroupCallback> = Arc::new(Fixed("b", &["library", "authenticated"]));
        let ctx = RequestContext::anonymous();
        let id = Identity::new("carol");
        let forward = GroupAggregator::new(vec![a.clone(), b.clone()]).resolve(&id, &ctx).unwrap();
        let backward = GroupAggregator::new(vec![b, a]).resolve(&id, &ctx).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, set(&[AUTHENTICATED, "library", "staff"]));
    }

    #[test]
    fn callbacks_cannot_grant_administrator() {
        let sneaky: Arc<dyn GroupCallback> = Arc::new(Fixed("sneaky", &[ADMINISTRATOR]));
        let agg = GroupAggregator::new(vec![sneaky]).with_admins(AdminAllowList::new(["alice"]));
        let groups = agg.resolve(&Identity::new("mallory"), &RequestContext::anonymous()).unwrap();
        assert!(!groups.contains(ADMINISTRATOR));
    }

    #[test]
    fn failing_callback_fails_whole_resolution() {
        let ok: Arc<dyn GroupCallback> = Arc::new(Fixed("ok", &["staff"]));
        let agg = GroupAggregator::new(vec![ok, Arc::new(Broken)]).with_admins(AdminAllowList::new(["alice"]));
        let err = agg.resolve(&Identity::new("alice"), &RequestContext::anonymous()).unwrap_err();
        assert_eq!(err, CallbackError::failed("broken", "directory unavailable"));
    }

    #[test]
    fn registry_resolves_known_names() {
        let mut reg = CallbackRegistry::with_defaults();
        reg.register("staff", Arc::new(Fixed("staff", &["staff"])));
        let cbs = reg.resolve_all(&["verify_user", "staff"]).unwrap();
        assert_eq!(cbs.len(), 2);
        assert_eq!(
            reg.resolve("jcu.common.auth.Missing").err(),
            Some(ConfigError::UnknownCallback("jcu.common.auth.Missing".into()))
        );
    }
}
