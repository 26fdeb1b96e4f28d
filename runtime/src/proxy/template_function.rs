//! Template-function role
//!
//! A template function is instantiated from its argument list, e.g.
//! `$(python --class-name demo.Upper -o mode=strict)`, and called once per
//! record to produce substitution text.

use super::{PluginBinding, PluginState, Role};
use crate::message::LogMessage;
use crate::preferences::{Preferences, DEFAULT_CLASS_PATH};
use crate::python::class_loader::{MethodSpec, Operation};
use crate::python::marshal::{from_managed_string, MessageScope};
use crate::{Error, Result};
use clap::Parser;
use pyo3::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateFunctionOp {
    Init,
    Call,
    Deinit,
}

impl Operation for TemplateFunctionOp {
    const ALL: &'static [Self] = &[
        TemplateFunctionOp::Init,
        TemplateFunctionOp::Call,
        TemplateFunctionOp::Deinit,
    ];

    fn spec(self) -> MethodSpec {
        match self {
            TemplateFunctionOp::Init => MethodSpec::optional("init", &[], "bool"),
            TemplateFunctionOp::Call => MethodSpec::required("call", &["message"], "str"),
            TemplateFunctionOp::Deinit => MethodSpec::optional("deinit", &[], "None"),
        }
    }
}

/// Template-function role marker
pub struct TemplateFunction;

impl Role for TemplateFunction {
    const NAME: &'static str = "template-function";
    type Op = TemplateFunctionOp;

    const INIT: Option<TemplateFunctionOp> = Some(TemplateFunctionOp::Init);
    const DEINIT: Option<TemplateFunctionOp> = Some(TemplateFunctionOp::Deinit);
}

/// Arguments of a template-function invocation
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "python", no_binary_name = true, disable_help_flag = true)]
pub struct TemplateFunctionArgs {
    /// Managed class implementing `call(message)`
    #[arg(short = 'n', long = "class-name")]
    pub class_name: String,

    /// Search path for the class
    #[arg(short = 'p', long = "class-path", default_value = DEFAULT_CLASS_PATH)]
    pub class_path: String,

    /// Option passed to the managed class, as `key=value`
    #[arg(short = 'o', long = "option", value_parser = parse_option)]
    pub options: Vec<(String, String)>,
}

fn parse_option(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

impl TemplateFunctionArgs {
    pub fn parse_from_argv<I, T>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(argv)
            .map_err(|e| Error::Config(format!("template function arguments: {}", e)))
    }

    pub fn preferences(&self) -> Preferences {
        let mut prefs = Preferences::for_class(self.class_name.clone())
            .with_class_path(self.class_path.clone());
        for (key, value) in &self.options {
            prefs.set_option(key, value.clone());
        }
        prefs
    }
}

/// Native side of a managed template function
#[derive(Debug)]
pub struct TemplateFunctionProxy {
    binding: PluginBinding<TemplateFunction>,
}

impl TemplateFunctionProxy {
    pub fn new(preferences: impl Into<Arc<Preferences>>) -> Result<Self> {
        Ok(Self {
            binding: PluginBinding::new(preferences)?,
        })
    }

    /// Parse the invocation arguments, then build and initialize the proxy
    pub fn prepare<I, T>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let args = TemplateFunctionArgs::parse_from_argv(argv)?;
        let mut proxy = Self::new(args.preferences())?;
        if !proxy.init() {
            return Err(Error::Instantiation {
                class_name: args.class_name,
                reason: "init() returned false".to_string(),
            });
        }
        Ok(proxy)
    }

    pub fn init(&mut self) -> bool {
        self.binding.init()
    }

    pub fn deinit(&mut self) {
        self.binding.deinit()
    }

    /// Substitution text for one record; None means "no output"
    pub fn call(&mut self, msg: &mut LogMessage) -> Option<String> {
        let result = self
            .binding
            .call(TemplateFunctionOp::Call, |py, method| {
                let scope = MessageScope::enter(py, msg)?;
                method
                    .call1((scope.view(py),))
                    .map(|value| from_managed_string(&value))
            })
            .and_then(|text| text);
        self.binding.recover(TemplateFunctionOp::Call, result, None)
    }

    /// Append the substitution text to `out`; appends nothing on None or failure
    pub fn call_into(&mut self, msg: &mut LogMessage, out: &mut String) {
        if let Some(text) = self.call(msg) {
            out.push_str(&text);
        }
    }

    pub fn state(&self) -> PluginState {
        self.binding.state()
    }

    pub fn binding(&self) -> &PluginBinding<TemplateFunction> {
        &self.binding
    }

    pub fn free(self) {
        self.binding.free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_long_forms() {
        let args = TemplateFunctionArgs::parse_from_argv([
            "-n",
            "demo.Upper",
            "--class-path",
            "/plugins",
            "-o",
            "mode=strict",
            "--option",
            "max-len=10",
        ])
        .unwrap();

        assert_eq!(args.class_name, "demo.Upper");
        assert_eq!(args.class_path, "/plugins");
        let prefs = args.preferences();
        assert_eq!(prefs.get_option("mode"), Some("strict"));
        assert_eq!(prefs.get_option("max_len"), Some("10"));
    }

    #[test]
    fn test_class_path_defaults() {
        let args = TemplateFunctionArgs::parse_from_argv(["--class-name", "demo.Upper"]).unwrap();
        assert_eq!(args.class_path, ".");
        assert!(args.options.is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            TemplateFunctionArgs::parse_from_argv(["-p", "/plugins"]),
            Err(Error::Config(_))
        ));
        assert!(TemplateFunctionArgs::parse_from_argv(["-n", "a.B", "-o", "novalue"]).is_err());
        assert!(TemplateFunctionArgs::parse_from_argv(["-n", "a.B", "--bogus"]).is_err());
    }
}
