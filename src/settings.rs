//! Flat string-keyed settings and their typed coercion.
//!
//! Settings are loaded once at startup (usually from a JSON object file) and are
//! read-only afterwards. Raw values arrive as strings; `Settings::coerce` applies a
//! table of per-key coercers and leaves every other key untouched. Coercers accept
//! values that are already typed, so coercing twice yields the same map.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<String>),
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            SettingValue::Str(s) => s.clone(),
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Int(i) => i.to_string(),
            SettingValue::Float(f) => f.to_string(),
            SettingValue::List(l) => l.join(" "),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self { SettingValue::Str(s.to_string()) }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self { SettingValue::Str(s) }
}

/// Coerces the value stored under `key`. Must accept its own output unchanged.
pub type Coercer = fn(&str, &SettingValue) -> Result<SettingValue, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn new() -> Self { Self::default() }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<SettingValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self { values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    /// Parse a flat JSON object. Strings, booleans, numbers and arrays of strings
    /// are accepted; nested objects are rejected.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ConfigError::File { path: "<settings>".into(), reason: e.to_string() })?;
        let Some(obj) = parsed.as_object() else {
            return Err(ConfigError::File { path: "<settings>".into(), reason: "expected a JSON object".into() });
        };
        let mut values = BTreeMap::new();
        for (key, v) in obj {
            let value = match v {
                serde_json::Value::String(s) => SettingValue::Str(s.clone()),
                serde_json::Value::Bool(b) => SettingValue::Bool(*b),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => SettingValue::Int(i),
                    None => SettingValue::Float(n.as_f64().unwrap_or_default()),
                },
                serde_json::Value::Array(items) => {
                    let mut list = Vec::with_capacity(items.len());
                    for item in items {
                        match item.as_str() {
                            Some(s) => list.push(s.to_string()),
                            None => return Err(ConfigError::invalid(key, item, "a list of strings")),
                        }
                    }
                    SettingValue::List(list)
                }
                serde_json::Value::Null => continue,
                serde_json::Value::Object(_) => return Err(ConfigError::invalid(key, "{...}", "a scalar or list")),
            };
            values.insert(key.clone(), value);
        }
        Ok(Self { values })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File { path: path.display().to_string(), reason: e.to_string() })?;
        Self::from_json_str(&text).map_err(|e| match e {
            ConfigError::File { reason, .. } => ConfigError::File { path: path.display().to_string(), reason },
            other => other,
        })
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> { self.values.get(key) }

    pub fn contains(&self, key: &str) -> bool { self.values.contains_key(key) }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.values.keys().map(|k| k.as_str()) }

    /// Raw string value; typed values are not rendered back to strings.
    pub fn get_str(&self, key: &str) -> Option<&str> { self.values.get(key).and_then(|v| v.as_str()) }

    pub fn require_str(&self, key: &str) -> Result<&str, ConfigError> {
        match self.get_str(key) {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(ConfigError::Missing(key.to_string())),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match as_bool(key, v)? {
                SettingValue::Bool(b) => Ok(b),
                _ => Ok(default),
            },
        }
    }

    pub fn list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(v) => match as_list(key, v)? {
                SettingValue::List(l) => Ok(l),
                _ => Ok(Vec::new()),
            },
        }
    }

    pub fn float_or(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match as_float(key, v)? {
                SettingValue::Float(f) => Ok(f),
                _ => Ok(default),
            },
        }
    }

    /// Apply `coercion` to the keys it names; other keys pass through unchanged.
    pub fn coerce(&self, coercion: &[(&str, Coercer)]) -> Result<Settings, ConfigError> {
        let mut out = BTreeMap::new();
        for (key, value) in &self.values {
            let coerced = match coercion.iter().find(|(k, _)| *k == key.as_str()) {
                Some((_, f)) => f(key, value)?,
                None => value.clone(),
            };
            out.insert(key.clone(), coerced);
        }
        Ok(Settings { values: out })
    }

    /// Keep only `prefix + key` entries for the given keys, with the prefix stripped.
    pub fn extract(&self, prefix: &str, keys: &[&str]) -> Settings {
        let values = self
            .values
            .iter()
            .filter_map(|(k, v)| {
                let stripped = k.strip_prefix(prefix)?;
                keys.contains(&stripped).then(|| (stripped.to_string(), v.clone()))
            })
            .collect();
        Settings { values }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

pub fn as_bool(key: &str, value: &SettingValue) -> Result<SettingValue, ConfigError> {
    match value {
        SettingValue::Bool(b) => Ok(SettingValue::Bool(*b)),
        SettingValue::Str(s) => parse_bool(s)
            .map(SettingValue::Bool)
            .ok_or_else(|| ConfigError::invalid(key, s, "a boolean")),
        SettingValue::Int(i @ (0 | 1)) => Ok(SettingValue::Bool(*i == 1)),
        other => Err(ConfigError::invalid(key, other.describe(), "a boolean")),
    }
}

/// Whitespace-separated list.
pub fn as_list(key: &str, value: &SettingValue) -> Result<SettingValue, ConfigError> {
    match value {
        SettingValue::List(l) => Ok(SettingValue::List(l.clone())),
        SettingValue::Str(s) => Ok(SettingValue::List(s.split_whitespace().map(str::to_string).collect())),
        other => Err(ConfigError::invalid(key, other.describe(), "a whitespace-separated list")),
    }
}

pub fn as_int(key: &str, value: &SettingValue) -> Result<SettingValue, ConfigError> {
    match value {
        SettingValue::Int(i) => Ok(SettingValue::Int(*i)),
        SettingValue::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(SettingValue::Int)
            .map_err(|_| ConfigError::invalid(key, s, "an integer")),
        other => Err(ConfigError::invalid(key, other.describe(), "an integer")),
    }
}

pub fn as_float(key: &str, value: &SettingValue) -> Result<SettingValue, ConfigError> {
    match value {
        SettingValue::Float(f) => Ok(SettingValue::Float(*f)),
        SettingValue::Int(i) => Ok(SettingValue::Float(*i as f64)),
        SettingValue::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(SettingValue::Float)
            .map_err(|_| ConfigError::invalid(key, s, "a number")),
        other => Err(ConfigError::invalid(key, other.describe(), "a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        Settings::from_pairs([
            ("jcu.auth.force_ssl", "yes"),
            ("jcu.auth.admins", "alice  bob\ncarol"),
            ("ldap.setup.retry_delay", "0.5"),
            ("unrelated", "keep me"),
        ])
    }

    fn table() -> Vec<(&'static str, Coercer)> {
        vec![
            ("jcu.auth.force_ssl", as_bool as Coercer),
            ("jcu.auth.admins", as_list as Coercer),
            ("ldap.setup.retry_delay", as_float as Coercer),
        ]
    }

    #[test]
    fn coerce_parses_recognised_keys_only() {
        let out = sample().coerce(&table()).unwrap();
        assert_eq!(out.get("jcu.auth.force_ssl"), Some(&SettingValue::Bool(true)));
        assert_eq!(
            out.get("jcu.auth.admins"),
            Some(&SettingValue::List(vec!["alice".into(), "bob".into(), "carol".into()]))
        );
        assert_eq!(out.get("ldap.setup.retry_delay"), Some(&SettingValue::Float(0.5)));
        assert_eq!(out.get_str("unrelated"), Some("keep me"));
    }

    #[test]
    fn coerce_is_idempotent() {
        let once = sample().coerce(&table()).unwrap();
        let twice = once.coerce(&table()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn malformed_boolean_is_an_error() {
        let s = Settings::from_pairs([("jcu.auth.force_ssl", "sometimes")]);
        let err = s.coerce(&table()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "jcu.auth.force_ssl"));
        assert!(s.bool_or("jcu.auth.force_ssl", false).is_err());
    }

    #[test]
    fn bool_and_list_defaults() {
        let s = Settings::new();
        assert!(!s.bool_or("missing", false).unwrap());
        assert!(s.bool_or("missing", true).unwrap());
        assert!(s.list("missing").unwrap().is_empty());
    }

    #[test]
    fn require_str_rejects_blank() {
        let s = Settings::from_pairs([("a", "  "), ("b", "home")]);
        assert_eq!(s.require_str("a"), Err(ConfigError::Missing("a".into())));
        assert_eq!(s.require_str("b"), Ok("home"));
        assert_eq!(s.require_str("c"), Err(ConfigError::Missing("c".into())));
    }

    #[test]
    fn extract_strips_prefix_and_filters_keys() {
        let s = Settings::from_pairs([
            ("ldap.setup.uri", "ldaps://ldap.example.com:636"),
            ("ldap.setup.pool_size", "10"),
            ("ldap.setup.bogus", "x"),
            ("ldap.login_query.base_dn", "dc=example,dc=com"),
        ]);
        let out = s.extract("ldap.setup.", &["uri", "pool_size", "timeout"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out.get_str("uri"), Some("ldaps://ldap.example.com:636"));
        assert_eq!(out.get_str("pool_size"), Some("10"));
    }

    #[test]
    fn json_settings_accept_typed_values() {
        let s = Settings::from_json_str(
            r#"{"jcu.auth.return_route": "home", "jcu.auth.force_ssl": true,
                "jcu.auth.admins": ["alice", "bob"], "recaptcha.timeout": 5, "nothing": null}"#,
        )
        .unwrap();
        assert_eq!(s.get_str("jcu.auth.return_route"), Some("home"));
        assert!(s.bool_or("jcu.auth.force_ssl", false).unwrap());
        assert_eq!(s.list("jcu.auth.admins").unwrap(), vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(s.float_or("recaptcha.timeout", 10.0).unwrap(), 5.0);
        assert!(!s.contains("nothing"));
    }

    #[test]
    fn json_settings_reject_nested_objects() {
        let err = Settings::from_json_str(r#"{"ldap": {"uri": "x"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(Settings::from_json_str("[1, 2]").is_err());
    }
}
