//! Integration tests for the parser proxy

mod common;

use common::PluginDir;
use logbridge_runtime::{LogMessage, ParserProxy};

const KV_PARSER: &str = r#"
class KeyValue:
    def __init__(self, handle):
        self.prefix = handle.get_option("prefix") or ""
    def init(self):
        return True
    def process(self, message, input):
        if "=" not in input:
            return False
        for pair in input.split():
            key, _, value = pair.partition("=")
            message[self.prefix + key.upper()] = value
        return True
"#;

/// Test: process writes the parsed fields into the record
#[test]
fn test_process_extracts_fields() {
    let dir = PluginDir::new().module("prs_kv", KV_PARSER);
    let mut parser = ParserProxy::new(dir.preferences("prs_kv.KeyValue")).unwrap();
    assert!(parser.init());

    let mut msg = LogMessage::new();
    assert!(parser.process(&mut msg, "user=alice action=login"));
    assert_eq!(msg.get_value("USER"), Some("alice"));
    assert_eq!(msg.get_value("ACTION"), Some("login"));

    assert!(!parser.process(&mut msg, "not key value"));
    parser.deinit();
}

/// Test: a duplicate is an independent instance with the same configuration
#[test]
fn test_duplicate() {
    let dir = PluginDir::new().module("prs_dup", KV_PARSER);
    let prefs = dir.preferences("prs_dup.KeyValue").with_option("prefix", "kv.");
    let mut parser = ParserProxy::new(prefs).unwrap();
    let mut copy = parser.duplicate().unwrap();

    assert_ne!(parser.binding().instance_id(), copy.binding().instance_id());
    assert_eq!(
        copy.binding().preferences().get_option("prefix"),
        Some("kv.")
    );
    assert!(copy.init());

    let mut msg = LogMessage::new();
    assert!(copy.process(&mut msg, "a=1"));
    assert_eq!(msg.get_value("kv.A"), Some("1"));

    parser.free();
    assert!(copy.process(&mut msg, "b=2"));
    copy.free();
}
