//! Configuration for the logbridge runtime
//!
//! Configuration can be loaded from a TOML file and/or environment variables.
//! The `[[plugins]]` table array describes plugin instances; each one turns
//! into a [`Preferences`] record for its proxy.

use crate::preferences::Preferences;
use crate::template::DEFAULT_TEMPLATE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Embedded runtime configuration
    #[serde(default)]
    pub runtime: RuntimeOptions,

    /// Configured plugin instances
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Startup options of the embedded runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Directories appended to the interpreter search path at start
    #[serde(default)]
    pub python_path: Vec<PathBuf>,

    /// Modules imported at start; a failing import aborts the start
    #[serde(default)]
    pub startup_modules: Vec<String>,

    /// Detach non-persistent threads after each unit of work
    #[serde(default = "default_detach_after_work_item")]
    pub detach_after_work_item: bool,
}

fn default_detach_after_work_item() -> bool {
    true
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            python_path: Vec::new(),
            startup_modules: Vec::new(),
            detach_after_work_item: default_detach_after_work_item(),
        }
    }
}

/// Plugin role served by a managed class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginRole {
    Reader,
    Destination,
    Filter,
    TemplateFunction,
    Parser,
}

impl PluginRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginRole::Reader => "reader",
            PluginRole::Destination => "destination",
            PluginRole::Filter => "filter",
            PluginRole::TemplateFunction => "template-function",
            PluginRole::Parser => "parser",
        }
    }
}

impl std::fmt::Display for PluginRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[[plugins]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Instance name used in logs
    pub name: String,

    /// Role the managed class serves
    pub role: PluginRole,

    /// Fully-qualified managed class name
    #[serde(rename = "class-name", alias = "class_name", default)]
    pub class_name: Option<String>,

    /// Search path for the class
    #[serde(rename = "class-path", alias = "class_path", default)]
    pub class_path: Option<String>,

    /// Destination template for text-only destinations
    #[serde(default)]
    pub template: Option<String>,

    /// Negate the decision of a filter
    #[serde(default)]
    pub negate: bool,

    /// Free-form options exposed to the managed class
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl PluginConfig {
    /// Build the preferences record for this plugin instance
    pub fn preferences(&self) -> Result<Preferences> {
        let class_name = self
            .class_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!("plugin '{}': class-name is required", self.name))
            })?;

        let mut prefs = Preferences::for_class(class_name);
        if let Some(class_path) = &self.class_path {
            prefs.set_class_path(class_path.clone());
        }
        for (key, value) in &self.options {
            prefs.set_option(key, value.clone());
        }
        Ok(prefs)
    }

    /// Destination template, falling back to the default
    pub fn template_or_default(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_TEMPLATE)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `LOGBRIDGE_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(level) = std::env::var("LOGBRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(paths) = std::env::var("LOGBRIDGE_PYTHON_PATH") {
            self.runtime
                .python_path
                .extend(std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()));
        }
        if let Ok(detach) = std::env::var("LOGBRIDGE_DETACH_AFTER_WORK_ITEM") {
            if let Ok(d) = detach.parse() {
                self.runtime.detach_after_work_item = d;
            }
        }
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                let mut config = Self::from_file(p)?;
                config.apply_env();
                return Ok(config);
            }
        }
        Ok(Self::from_env())
    }

    /// Find a plugin entry by name
    pub fn plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.runtime.detach_after_work_item);
        assert!(config.runtime.python_path.is_empty());
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[logging]
level = "debug"

[runtime]
python_path = ["/opt/plugins"]
startup_modules = ["json"]
detach_after_work_item = false

[[plugins]]
name = "es"
role = "destination"
class-name = "demo.Elastic"
class-path = "/plugins:/plugins/lib.zip"
template = "$MSG"

[plugins.options]
cluster-name = "prod"

[[plugins]]
name = "drop-debug"
role = "filter"
class-name = "demo.Filter"
negate = true
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.runtime.python_path, vec![PathBuf::from("/opt/plugins")]);
        assert_eq!(config.runtime.startup_modules, vec!["json".to_string()]);
        assert!(!config.runtime.detach_after_work_item);
        assert_eq!(config.plugins.len(), 2);

        let es = config.plugin("es").unwrap();
        assert_eq!(es.role, PluginRole::Destination);
        assert_eq!(es.template_or_default(), "$MSG");
        let prefs = es.preferences().unwrap();
        assert_eq!(prefs.class_name(), "demo.Elastic");
        assert_eq!(prefs.class_path(), "/plugins:/plugins/lib.zip");
        assert_eq!(prefs.get_option("cluster_name"), Some("prod"));

        let filter = config.plugin("drop-debug").unwrap();
        assert!(filter.negate);
        assert_eq!(filter.template_or_default(), DEFAULT_TEMPLATE);
        assert_eq!(filter.preferences().unwrap().class_path(), ".");
    }

    #[test]
    fn test_missing_class_name_is_rejected() {
        let toml = r#"
[[plugins]]
name = "broken"
role = "reader"
"#;
        let config = Config::from_toml(toml).unwrap();
        let err = config.plugins[0].preferences().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_unknown_role_fails_to_parse() {
        let toml = r#"
[[plugins]]
name = "x"
role = "source"
class-name = "a.B"
"#;
        assert!(matches!(Config::from_toml(toml), Err(Error::Toml(_))));
    }

    #[test]
    fn test_role_names() {
        assert_eq!(PluginRole::TemplateFunction.to_string(), "template-function");
        assert_eq!(PluginRole::Reader.as_str(), "reader");
    }
}
