use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DISPLAY_NAME_ATTR: &str = "cn";

/// Attributes released by the identity provider for one authentication event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), attrs: BTreeMap::new() }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> { self.attrs.get(key).map(|s| s.as_str()) }

    pub fn display_name(&self) -> Option<&str> { self.attr(DISPLAY_NAME_ATTR) }
}
