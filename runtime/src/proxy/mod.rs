//! Role proxies
//!
//! Each pipeline role is a thin configuration of [`PluginBinding`]: a
//! [`Role`] names its managed operations and lifecycle hooks, and the proxy
//! type adds the role's data-path calls on top.

pub mod binding;
pub mod destination;
pub mod filter;
pub mod parser;
pub mod reader;
pub mod template_function;

pub use binding::{PluginBinding, PluginState};
pub use destination::{DestinationOp, DestinationProxy};
pub use filter::{FilterNode, FilterOp, FilterProxy};
pub use parser::{ParserOp, ParserProxy};
pub use reader::{ReaderOp, ReaderProxy};
pub use template_function::{TemplateFunctionArgs, TemplateFunctionOp, TemplateFunctionProxy};

use crate::config::{PluginConfig, PluginRole};
use crate::python::class_loader::{ClassHandle, Operation};
use crate::template::LogTemplate;
use crate::Result;

/// Static description of a plugin role
pub trait Role: Send + 'static {
    /// Role name exposed to managed code as `PluginHandle.role`
    const NAME: &'static str;

    type Op: Operation;

    const INIT: Option<Self::Op> = None;
    const DEINIT: Option<Self::Op> = None;
    const OPEN: Option<Self::Op> = None;
    const CLOSE: Option<Self::Op> = None;
    const IS_OPENED: Option<Self::Op> = None;

    /// Class-level checks beyond per-method requirements
    fn validate(_class: &ClassHandle<Self::Op>) -> Result<()> {
        Ok(())
    }
}

/// A proxy of any role, built from a `[[plugins]]` entry
#[derive(Debug)]
pub enum PluginInstance {
    Reader(ReaderProxy),
    Destination(DestinationProxy),
    Filter(FilterNode),
    TemplateFunction(TemplateFunctionProxy),
    Parser(ParserProxy),
}

impl PluginInstance {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let preferences = config.preferences()?;
        Ok(match config.role {
            PluginRole::Reader => PluginInstance::Reader(ReaderProxy::new(preferences)?),
            PluginRole::Destination => {
                let template = LogTemplate::compile(config.template_or_default())?;
                PluginInstance::Destination(DestinationProxy::new(preferences, template)?)
            }
            PluginRole::Filter => {
                PluginInstance::Filter(FilterNode::new(preferences, config.negate))
            }
            PluginRole::TemplateFunction => {
                PluginInstance::TemplateFunction(TemplateFunctionProxy::new(preferences)?)
            }
            PluginRole::Parser => PluginInstance::Parser(ParserProxy::new(preferences)?),
        })
    }

    pub fn role(&self) -> PluginRole {
        match self {
            PluginInstance::Reader(_) => PluginRole::Reader,
            PluginInstance::Destination(_) => PluginRole::Destination,
            PluginInstance::Filter(_) => PluginRole::Filter,
            PluginInstance::TemplateFunction(_) => PluginRole::TemplateFunction,
            PluginInstance::Parser(_) => PluginRole::Parser,
        }
    }

    pub fn init(&mut self) -> bool {
        match self {
            PluginInstance::Reader(proxy) => proxy.init(),
            PluginInstance::Destination(proxy) => proxy.init(),
            PluginInstance::Filter(node) => node.init(),
            PluginInstance::TemplateFunction(proxy) => proxy.init(),
            PluginInstance::Parser(proxy) => proxy.init(),
        }
    }

    pub fn deinit(&mut self) {
        match self {
            PluginInstance::Reader(proxy) => proxy.deinit(),
            PluginInstance::Destination(proxy) => proxy.deinit(),
            PluginInstance::Filter(node) => node.deinit(),
            PluginInstance::TemplateFunction(proxy) => proxy.deinit(),
            PluginInstance::Parser(proxy) => proxy.deinit(),
        }
    }
}
