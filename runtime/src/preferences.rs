//! Plugin preferences
//!
//! A `Preferences` record carries what a proxy needs to locate and configure
//! its managed class: the dotted class name, the class-path to search, and
//! the free-form options handed to the managed side through
//! `PluginHandle.get_option`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default class-path when none is configured
pub const DEFAULT_CLASS_PATH: &str = ".";

/// Normalize an option key so `foo-bar` and `foo_bar` resolve identically
pub fn normalize_key(key: &str) -> String {
    key.replace('-', "_")
}

/// Configuration record of one plugin instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(rename = "class-name", alias = "class_name", default)]
    class_name: String,

    #[serde(
        rename = "class-path",
        alias = "class_path",
        default = "default_class_path"
    )]
    class_path: String,

    #[serde(default, deserialize_with = "deserialize_options")]
    options: BTreeMap<String, String>,
}

fn deserialize_options<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| (normalize_key(&key), value))
        .collect())
}

fn default_class_path() -> String {
    DEFAULT_CLASS_PATH.to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            class_path: default_class_path(),
            options: BTreeMap::new(),
        }
    }
}

impl Preferences {
    /// Create an empty record with the default class-path
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for `class_name` with the default class-path
    pub fn for_class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    /// Builder form of [`set_class_path`](Self::set_class_path)
    pub fn with_class_path(mut self, class_path: impl Into<String>) -> Self {
        self.set_class_path(class_path);
        self
    }

    /// Builder form of [`set_option`](Self::set_option)
    pub fn with_option(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_option(key, value);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn set_class_name(&mut self, class_name: impl Into<String>) {
        self.class_name = class_name.into();
    }

    pub fn class_path(&self) -> &str {
        &self.class_path
    }

    pub fn set_class_path(&mut self, class_path: impl Into<String>) {
        self.class_path = class_path.into();
    }

    /// Store `value` under the normalized form of `key`
    pub fn set_option(&mut self, key: &str, value: impl Into<String>) {
        self.options.insert(normalize_key(key), value.into());
    }

    /// Look up an option, normalizing `key` the same way `set_option` does
    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(&normalize_key(key)).map(String::as_str)
    }

    /// All options, keyed by their normalized names
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Overwrite `dst` with a deep copy of this record
    pub fn clone_into(&self, dst: &mut Preferences) {
        dst.class_name.clone_from(&self.class_name);
        dst.class_path.clone_from(&self.class_path);
        dst.options.clone_from(&self.options);
    }
}
