//! LDAP role integration.
//!
//! Settings are read under three prefixes (overridable through
//! `pyramid_ldap.<section>.prefix`) and coerced from their string form:
//!
//! ```text
//! ldap.setup.uri = ldaps://ldap.example.com:636
//! ldap.setup.bind = uid=david,dc=example,dc=com
//! ldap.setup.passwd = itsasecret
//! ldap.setup.pool_size = 10
//! ldap.setup.retry_max = 3
//! ldap.setup.retry_delay = 0.1
//! ldap.setup.use_tls = false
//! ldap.setup.timeout = 3
//! ldap.setup.use_pool = true
//!
//! ldap.login_query.base_dn = dc=example,dc=com
//! ldap.login_query.filter_tmpl = (uid=${login})
//! ldap.login_query.scope = ldap.SCOPE_ONELEVEL
//! ldap.login_query.cache_period = 600
//!
//! ldap.groups_query.base_dn = ou=org,dc=example,dc=com
//! ldap.groups_query.filter_tmpl = (&(cn=RoleName)(roleOccupant=${userdn}))
//! ldap.groups_query.scope = ldap.SCOPE_SUBTREE
//! ldap.groups_query.cache_period = 600
//! ```
//!
//! A section is configured only when at least one of its keys is present.
//! Connections and searches belong to a `GroupLookup` implementation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{CallbackError, ConfigError};
use crate::identity::{CallbackRegistry, GroupCallback, GroupSet, Identity, RequestContext};
use crate::settings::{as_bool, as_float, as_int, Coercer, SettingValue, Settings};

pub const SETUP_PREFIX_KEY: &str = "pyramid_ldap.setup.prefix";
pub const LOGIN_QUERY_PREFIX_KEY: &str = "pyramid_ldap.login_query.prefix";
pub const GROUPS_QUERY_PREFIX_KEY: &str = "pyramid_ldap.groups_query.prefix";

pub const DEFAULT_SETUP_PREFIX: &str = "ldap.setup.";
pub const DEFAULT_LOGIN_QUERY_PREFIX: &str = "ldap.login_query.";
pub const DEFAULT_GROUPS_QUERY_PREFIX: &str = "ldap.groups_query.";

pub const LOGIN_PLACEHOLDER: &str = "${login}";
pub const USERDN_PLACEHOLDER: &str = "${userdn}";

pub const DEFAULT_USERS_BASE: &str = "ou=users,dc=jcu,dc=edu,dc=au";

const SETUP_KEYS: &[&str] = &[
    "uri", "bind", "passwd", "pool_size", "retry_max", "retry_delay", "use_tls", "timeout", "use_pool",
];
const QUERY_KEYS: &[&str] = &["base_dn", "filter_tmpl", "scope", "cache_period"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LdapScope {
    Base = 0,
    OneLevel = 1,
    Subtree = 2,
}

impl LdapScope {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(LdapScope::Base),
            1 => Some(LdapScope::OneLevel),
            2 => Some(LdapScope::Subtree),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let name = s.trim();
        let name = name.strip_prefix("ldap.").unwrap_or(name);
        match name.to_ascii_uppercase().as_str() {
            "SCOPE_BASE" => Some(LdapScope::Base),
            "SCOPE_ONELEVEL" => Some(LdapScope::OneLevel),
            "SCOPE_SUBTREE" => Some(LdapScope::Subtree),
            other => other.parse::<i64>().ok().and_then(Self::from_i64),
        }
    }
}

/// Coerces a scope name or number into its integer value.
pub fn as_ldap_scope(key: &str, value: &SettingValue) -> Result<SettingValue, ConfigError> {
    let scope = match value {
        SettingValue::Int(i) => LdapScope::from_i64(*i),
        SettingValue::Str(s) => LdapScope::parse(s),
        _ => None,
    };
    scope
        .map(|s| SettingValue::Int(s as i64))
        .ok_or_else(|| ConfigError::invalid(key, format!("{value:?}"), "an LDAP scope"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct LdapSetup {
    pub uri: String,
    pub bind: Option<String>,
    pub passwd: Option<String>,
    pub pool_size: u32,
    pub retry_max: u32,
    pub retry_delay: f64,
    pub use_tls: bool,
    /// Seconds; negative means no timeout.
    pub timeout: f64,
    pub use_pool: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LdapQuery {
    pub base_dn: String,
    pub filter_tmpl: String,
    pub scope: LdapScope,
    pub cache_period: f64,
}

impl LdapQuery {
    /// Substitute `placeholder` in the filter template with an escaped `value`.
    pub fn render_filter(&self, placeholder: &str, value: &str) -> String {
        self.filter_tmpl.replace(placeholder, &escape_filter_value(value))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LdapSettings {
    pub setup: Option<LdapSetup>,
    pub login_query: Option<LdapQuery>,
    pub groups_query: Option<LdapQuery>,
}

fn setup_coercion() -> Vec<(&'static str, Coercer)> {
    vec![
        ("pool_size", as_int as Coercer),
        ("retry_max", as_int as Coercer),
        ("retry_delay", as_float as Coercer),
        ("timeout", as_float as Coercer),
        ("use_tls", as_bool as Coercer),
        ("use_pool", as_bool as Coercer),
    ]
}

fn query_coercion() -> Vec<(&'static str, Coercer)> {
    vec![("scope", as_ldap_scope as Coercer), ("cache_period", as_float as Coercer)]
}

fn prefix<'a>(settings: &'a Settings, key: &str, default: &'a str) -> &'a str {
    settings.get_str(key).unwrap_or(default)
}

fn int_or(s: &Settings, key: &str, default: i64) -> Result<u32, ConfigError> {
    match s.get(key) {
        Some(SettingValue::Int(i)) => u32::try_from(*i).map_err(|_| ConfigError::invalid(key, i, "a non-negative integer")),
        _ => Ok(default as u32),
    }
}

fn scope_or(s: &Settings, default: LdapScope) -> LdapScope {
    match s.get("scope") {
        Some(SettingValue::Int(i)) => LdapScope::from_i64(*i).unwrap_or(default),
        _ => default,
    }
}

fn parse_query(raw: &Settings, prefix: &str, default_scope: LdapScope) -> Result<Option<LdapQuery>, ConfigError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let s = raw.coerce(&query_coercion())?;
    let required = |k: &str| s.require_str(k).map(str::to_string).map_err(|_| ConfigError::Missing(format!("{prefix}{k}")));
    Ok(Some(LdapQuery {
        base_dn: required("base_dn")?,
        filter_tmpl: required("filter_tmpl")?,
        scope: scope_or(&s, default_scope),
        cache_period: s.float_or("cache_period", 0.0)?,
    }))
}

impl LdapSettings {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let setup_prefix = prefix(settings, SETUP_PREFIX_KEY, DEFAULT_SETUP_PREFIX);
        let raw = settings.extract(setup_prefix, SETUP_KEYS);
        let setup = if raw.is_empty() {
            None
        } else {
            let s = raw.coerce(&setup_coercion())?;
            Some(LdapSetup {
                uri: s
                    .require_str("uri")
                    .map_err(|_| ConfigError::Missing(format!("{setup_prefix}uri")))?
                    .to_string(),
                bind: s.get_str("bind").map(str::to_string),
                passwd: s.get_str("passwd").map(str::to_string),
                pool_size: int_or(&s, "pool_size", 10)?,
                retry_max: int_or(&s, "retry_max", 3)?,
                retry_delay: s.float_or("retry_delay", 0.1)?,
                use_tls: s.bool_or("use_tls", false)?,
                timeout: s.float_or("timeout", -1.0)?,
                use_pool: s.bool_or("use_pool", true)?,
            })
        };

        let login_prefix = prefix(settings, LOGIN_QUERY_PREFIX_KEY, DEFAULT_LOGIN_QUERY_PREFIX);
        let login_query = parse_query(&settings.extract(login_prefix, QUERY_KEYS), login_prefix, LdapScope::OneLevel)?;

        let groups_prefix = prefix(settings, GROUPS_QUERY_PREFIX_KEY, DEFAULT_GROUPS_QUERY_PREFIX);
        let groups_query = parse_query(&settings.extract(groups_prefix, QUERY_KEYS), groups_prefix, LdapScope::Subtree)?;

        let out = Self { setup, login_query, groups_query };
        info!(
            target: "startup",
            "ldap settings: setup={}, login_query={}, groups_query={}",
            out.setup.is_some(),
            out.login_query.is_some(),
            out.groups_query.is_some()
        );
        Ok(out)
    }

    pub fn login_filter(&self, login: &str) -> Option<String> {
        self.login_query.as_ref().map(|q| q.render_filter(LOGIN_PLACEHOLDER, login))
    }

    pub fn groups_filter(&self, user_dn: &str) -> Option<String> {
        self.groups_query.as_ref().map(|q| q.render_filter(USERDN_PLACEHOLDER, user_dn))
    }
}

/// RFC 4515 escaping for values placed inside a search filter.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

/// RFC 4514 escaping for an attribute value inside a DN.
pub fn escape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

pub fn user_dn(user_id: &str, users_base: &str) -> String {
    format!("uid={},{}", escape_dn_value(user_id), users_base)
}

/// Directory search collaborator: groups the given DN belongs to.
pub trait GroupLookup: Send + Sync {
    fn groups_for(&self, user_dn: &str, request: &RequestContext) -> Result<Option<GroupSet>, CallbackError>;
}

/// Group callback reporting the LDAP roles the identity holds.
pub struct LdapGroupCallback {
    lookup: Arc<dyn GroupLookup>,
    users_base: String,
}

impl LdapGroupCallback {
    pub fn new(lookup: Arc<dyn GroupLookup>) -> Self {
        Self { lookup, users_base: DEFAULT_USERS_BASE.to_string() }
    }

    pub fn with_users_base(mut self, base: impl Into<String>) -> Self {
        self.users_base = base.into();
        self
    }
}

pub const LDAP_CALLBACK: &str = "ldap_roles";

impl GroupCallback for LdapGroupCallback {
    fn name(&self) -> &str { LDAP_CALLBACK }

    fn groups(&self, identity: &Identity, request: &RequestContext) -> Result<Option<GroupSet>, CallbackError> {
        let dn = user_dn(&identity.user_id, &self.users_base);
        debug!(target: "auth", dn = %dn, "ldap group lookup");
        self.lookup.groups_for(&dn, request)
    }
}

impl CallbackRegistry {
    /// Default callbacks plus `ldap_roles` answered by `lookup`.
    pub fn with_ldap(lookup: Arc<dyn GroupLookup>) -> Self {
        let mut registry = Self::with_defaults();
        registry.register(LDAP_CALLBACK, Arc::new(LdapGroupCallback::new(lookup)));
        registry
    }
}
