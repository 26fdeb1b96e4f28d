//! Filter role
//!
//! [`FilterProxy`] returns the managed decision as-is. [`FilterNode`] is the
//! expression-tree node the pipeline evaluates: it owns the negation flag
//! and builds its proxy lazily at `init`.

use super::{PluginBinding, PluginState, Role};
use crate::message::LogMessage;
use crate::preferences::Preferences;
use crate::python::class_loader::{MethodSpec, Operation};
use crate::python::runtime::Runtime;
use crate::Result;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Init,
    Eval,
    Deinit,
}

impl Operation for FilterOp {
    const ALL: &'static [Self] = &[FilterOp::Init, FilterOp::Eval, FilterOp::Deinit];

    fn spec(self) -> MethodSpec {
        match self {
            FilterOp::Init => MethodSpec::required("init", &[], "bool"),
            FilterOp::Eval => MethodSpec::required("eval", &["message"], "bool"),
            FilterOp::Deinit => MethodSpec::optional("deinit", &[], "None"),
        }
    }
}

/// Filter role marker
pub struct Filter;

impl Role for Filter {
    const NAME: &'static str = "filter";
    type Op = FilterOp;

    const INIT: Option<FilterOp> = Some(FilterOp::Init);
    const DEINIT: Option<FilterOp> = Some(FilterOp::Deinit);
}

/// Native side of a managed filter
#[derive(Debug)]
pub struct FilterProxy {
    binding: PluginBinding<Filter>,
}

impl FilterProxy {
    pub fn new(preferences: impl Into<Arc<Preferences>>) -> Result<Self> {
        Ok(Self {
            binding: PluginBinding::new(preferences)?,
        })
    }

    pub fn init(&mut self) -> bool {
        self.binding.init()
    }

    pub fn deinit(&mut self) {
        self.binding.deinit()
    }

    /// The managed decision, false if the call fails
    pub fn eval(&mut self, msg: &mut LogMessage) -> bool {
        let result = self.binding.call_with_message(FilterOp::Eval, msg);
        self.binding.recover(FilterOp::Eval, result, false)
    }

    pub fn state(&self) -> PluginState {
        self.binding.state()
    }

    pub fn binding(&self) -> &PluginBinding<Filter> {
        &self.binding
    }

    pub fn free(self) {
        self.binding.free()
    }
}

/// Filter-expression node backed by a managed filter
#[derive(Debug)]
pub struct FilterNode {
    preferences: Arc<Preferences>,
    negate: bool,
    proxy: Option<FilterProxy>,
}

impl FilterNode {
    pub fn new(preferences: impl Into<Arc<Preferences>>, negate: bool) -> Self {
        Self {
            preferences: preferences.into(),
            negate,
            proxy: None,
        }
    }

    pub fn negate(&self) -> bool {
        self.negate
    }

    pub fn set_negate(&mut self, negate: bool) {
        self.negate = negate;
    }

    pub fn preferences(&self) -> &Arc<Preferences> {
        &self.preferences
    }

    pub fn proxy(&self) -> Option<&FilterProxy> {
        self.proxy.as_ref()
    }

    /// Build and initialize the proxy; a node that already has one is left as is
    pub fn init(&mut self) -> bool {
        if let Some(proxy) = self.proxy.as_mut() {
            return proxy.init();
        }
        match FilterProxy::new(self.preferences.clone()) {
            Ok(mut proxy) => {
                let ok = proxy.init();
                self.proxy = Some(proxy);
                ok
            }
            Err(e) => {
                tracing::error!(
                    class_name = self.preferences.class_name(),
                    error = %e,
                    "Failed to create filter proxy"
                );
                false
            }
        }
    }

    /// Managed decision XOR `negate`; a node without a proxy matches nothing
    pub fn eval(&mut self, msg: &mut LogMessage) -> bool {
        let Some(proxy) = self.proxy.as_mut() else {
            return false;
        };
        let matched = proxy.eval(msg) ^ self.negate;
        Runtime::global().work_item_done();
        matched
    }

    pub fn deinit(&mut self) {
        if let Some(proxy) = self.proxy.as_mut() {
            proxy.deinit();
        }
    }

    /// Release the proxy, if one was built
    pub fn free(self) {
        if let Some(proxy) = self.proxy {
            proxy.free();
        }
    }
}
