//! Integration tests for filters and filter-expression nodes

mod common;

use common::PluginDir;
use logbridge_runtime::{FilterNode, FilterProxy, LogMessage, Preferences};

const ALWAYS_TRUE: &str = r#"
class Filter:
    def __init__(self, handle): pass
    def init(self): return True
    def eval(self, message): return True
"#;

/// Test: negation turns an always-true managed filter into false
#[test]
fn test_negated_filter() {
    let dir = PluginDir::new().module("flt_true", ALWAYS_TRUE);

    let mut plain = FilterNode::new(dir.preferences("flt_true.Filter"), false);
    let mut negated = FilterNode::new(dir.preferences("flt_true.Filter"), true);
    assert!(plain.init());
    assert!(negated.init());

    let mut msg = LogMessage::from_text("anything");
    assert!(plain.eval(&mut msg));
    assert!(!negated.eval(&mut msg));

    plain.deinit();
    negated.deinit();
    plain.free();
    negated.free();
}

/// Test: the proxy itself returns the raw decision
#[test]
fn test_proxy_returns_raw_decision() {
    let dir = PluginDir::new().module("flt_raw", ALWAYS_TRUE);
    let mut proxy = FilterProxy::new(dir.preferences("flt_raw.Filter")).unwrap();
    assert!(proxy.init());
    assert!(proxy.eval(&mut LogMessage::new()));
}

/// Test: options from the shared preferences drive the decision
#[test]
fn test_filter_reads_options() {
    let source = r#"
import logbridge

class Filter:
    def __init__(self, handle):
        self.level = logbridge.get_option(handle, "min-level")
    def init(self):
        return self.level is not None
    def eval(self, message):
        return message.get_value("LEVEL") == self.level
"#;
    let dir = PluginDir::new().module("flt_options", source);

    let mut missing = FilterNode::new(dir.preferences("flt_options.Filter"), false);
    assert!(!missing.init());

    let mut node = FilterNode::new(
        dir.preferences("flt_options.Filter")
            .with_option("min_level", "error"),
        false,
    );
    assert!(node.init());
    assert!(node.eval(&mut LogMessage::new().with_value("LEVEL", "error")));
    assert!(!node.eval(&mut LogMessage::new().with_value("LEVEL", "info")));
}

/// Test: a node whose class cannot be loaded matches nothing, negated or not
#[test]
fn test_node_without_proxy_is_false() {
    let prefs = Preferences::for_class("flt_missing_module.Filter").with_class_path("/nonexistent");
    let mut node = FilterNode::new(prefs, true);
    assert!(!node.init());
    assert!(node.proxy().is_none());
    assert!(!node.eval(&mut LogMessage::new()));
}

/// Test: a raising eval counts as "no match" before negation
#[test]
fn test_eval_exception() {
    let source = r#"
class Filter:
    def __init__(self, handle): pass
    def init(self): return True
    def eval(self, message): raise KeyError("LEVEL")
    def deinit(self): pass
"#;
    let dir = PluginDir::new().module("flt_raises", source);
    let mut node = FilterNode::new(dir.preferences("flt_raises.Filter"), false);
    assert!(node.init());
    assert!(!node.eval(&mut LogMessage::new()));

    node.set_negate(true);
    assert!(node.eval(&mut LogMessage::new()));
}
