//! Integration tests for building plugin instances from `[[plugins]]` entries
//!
//! Tests that look at the runtime reference count take `SERIAL`, like the
//! lifecycle tests do.

mod common;

use common::{module_attr, PluginDir};
use logbridge_runtime::{Config, Error, LogMessage, PluginInstance, PluginRole, Runtime};
use parking_lot::Mutex;
use std::process::Command;

static SERIAL: Mutex<()> = Mutex::new(());

const READER: &str = r#"
class Reader:
    def __init__(self, handle): self.handle = handle
    def init(self): return True
    def deinit(self): pass
    def open(self): return True
    def close(self): pass
    def is_opened(self): return True
    def is_readable(self): return True
    def fetch(self, message): return False
    def get_bookmark(self): return "0"
    def seek_to_bookmark(self, bookmark): return True
    def get_name_by_uniq_options(self):
        return "tail:" + self.handle.get_option("path")
"#;

const DESTINATION: &str = r#"
sent = []

class Destination:
    def __init__(self, handle): pass
    def init(self): return True
    def deinit(self): pass
    def open(self): return True
    def close(self): pass
    def is_opened(self): return True
    def on_message_queue_empty(self): pass
    def send(self, text):
        sent.append(text)
        return True
"#;

const FILTER: &str = r#"
class Filter:
    def __init__(self, handle): pass
    def init(self): return True
    def eval(self, message): return True
"#;

const TEMPLATE_FUNCTION: &str = r#"
class Upper:
    def __init__(self, handle): pass
    def call(self, message): return message["MESSAGE"].upper()
"#;

const PARSER: &str = r#"
class Parser:
    def __init__(self, handle): pass
    def init(self): return True
    def process(self, message, input):
        message["MESSAGE"] = input.strip()
        return True
"#;

fn config_for(dir: &PluginDir, plugins: &str) -> String {
    format!(
        "[logging]\nlevel = \"off\"\n\n{}",
        plugins.replace("{class_path}", &format!("{:?}", dir.class_path()))
    )
}

/// Test: every role is built from its entry and survives init/deinit
#[test]
fn test_every_role_from_config() {
    let _serial = SERIAL.lock();
    let dir = PluginDir::new()
        .module("cfg_reader", READER)
        .module("cfg_destination", DESTINATION)
        .module("cfg_filter", FILTER)
        .module("cfg_template_function", TEMPLATE_FUNCTION)
        .module("cfg_parser", PARSER);

    let toml = config_for(
        &dir,
        r#"
[[plugins]]
name = "tail"
role = "reader"
class-name = "cfg_reader.Reader"
class-path = {class_path}
options = { path = "/var/log/app.log" }

[[plugins]]
name = "out"
role = "destination"
class-name = "cfg_destination.Destination"
class-path = {class_path}
template = "$HOST $MSG"

[[plugins]]
name = "drop-all"
role = "filter"
class-name = "cfg_filter.Filter"
class-path = {class_path}
negate = true

[[plugins]]
name = "upper"
role = "template-function"
class-name = "cfg_template_function.Upper"
class-path = {class_path}

[[plugins]]
name = "strip"
role = "parser"
class-name = "cfg_parser.Parser"
class-path = {class_path}
"#,
    );
    let config = Config::from_toml(&toml).unwrap();
    assert_eq!(config.plugins.len(), 5);

    for plugin in &config.plugins {
        let mut instance = PluginInstance::from_config(plugin).unwrap();
        assert_eq!(instance.role(), plugin.role);
        assert!(instance.init(), "{} should initialize", plugin.name);

        match &mut instance {
            PluginInstance::Reader(reader) => {
                assert_eq!(
                    reader.get_name_by_uniq_options().as_deref(),
                    Some("tail:/var/log/app.log")
                );
            }
            PluginInstance::Destination(dest) => {
                assert_eq!(dest.template().source(), "$HOST $MSG");
                assert!(dest.open());
                let mut msg = LogMessage::from_text("hello").with_value("HOST", "web-1");
                assert!(dest.send(&mut msg));
            }
            PluginInstance::Filter(node) => {
                assert!(node.negate());
                assert!(!node.eval(&mut LogMessage::from_text("anything")));
            }
            PluginInstance::TemplateFunction(function) => {
                let mut msg = LogMessage::from_text("quiet");
                assert_eq!(function.call(&mut msg).as_deref(), Some("QUIET"));
            }
            PluginInstance::Parser(parser) => {
                let mut msg = LogMessage::new();
                assert!(parser.process(&mut msg, "  raw line \n"));
                assert_eq!(msg.get_value("MESSAGE"), Some("raw line"));
            }
        }

        instance.deinit();
    }

    assert_eq!(
        module_attr::<Vec<String>>("cfg_destination", "sent"),
        vec!["web-1 hello".to_string()]
    );
}

/// Test: a missing class-name is a configuration error and never starts the runtime
#[test]
fn test_missing_class_name_is_config_error() {
    let _serial = SERIAL.lock();
    let config = Config::from_toml(
        r#"
[[plugins]]
name = "anonymous"
role = "destination"
template = "$MSG"
"#,
    )
    .unwrap();

    let before = Runtime::global().reference_count();
    match PluginInstance::from_config(&config.plugins[0]) {
        Err(Error::Config(reason)) => assert!(reason.contains("anonymous")),
        other => panic!("expected a configuration error, got {:?}", other),
    }
    assert_eq!(Runtime::global().reference_count(), before);
}

/// Test: an invalid destination template is rejected when the entry is built
#[test]
fn test_invalid_template_is_rejected() {
    let _serial = SERIAL.lock();
    let dir = PluginDir::new().module("cfg_bad_template", DESTINATION);
    let toml = config_for(
        &dir,
        r#"
[[plugins]]
name = "broken"
role = "destination"
class-name = "cfg_bad_template.Destination"
class-path = {class_path}
template = "${MSG"
"#,
    );
    let config = Config::from_toml(&toml).unwrap();
    assert_eq!(config.plugins[0].role, PluginRole::Destination);
    assert!(matches!(
        PluginInstance::from_config(&config.plugins[0]),
        Err(Error::Config(_))
    ));
}

fn run_check(config: &str, extra: &[&str]) -> std::process::Output {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), config).unwrap();
    Command::new(env!("CARGO_BIN_EXE_logbridge-check"))
        .arg("--config")
        .arg(file.path())
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

/// Test: the check CLI reports every plugin and exits 1 when one fails
#[test]
fn test_check_cli_exit_codes() {
    let dir = PluginDir::new()
        .module("check_cli_filter", FILTER)
        .module("check_cli_parser", PARSER);
    let config = config_for(
        &dir,
        r#"
[[plugins]]
name = "keep"
role = "filter"
class-name = "check_cli_filter.Filter"
class-path = {class_path}

[[plugins]]
name = "strip"
role = "parser"
class-name = "check_cli_parser.Parser"
class-path = {class_path}

[[plugins]]
name = "ghost"
role = "reader"
class-name = "check_cli_missing.Reader"
class-path = {class_path}
"#,
    );

    let healthy = run_check(&config, &["--plugin", "keep", "--plugin", "strip", "--json"]);
    assert_eq!(healthy.status.code(), Some(0));
    let reports: serde_json::Value = serde_json::from_slice(&healthy.stdout).unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r["ok"] == true));

    let all = run_check(&config, &["--json"]);
    assert_eq!(all.status.code(), Some(1));
    let reports: serde_json::Value = serde_json::from_slice(&all.stdout).unwrap();
    let ghost = reports
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "ghost")
        .unwrap();
    assert_eq!(ghost["ok"], false);
    assert!(ghost["error"]
        .as_str()
        .unwrap()
        .contains("check_cli_missing.Reader"));

    let unknown = run_check(&config, &["--plugin", "nope"]);
    assert_eq!(unknown.status.code(), Some(1));
}
