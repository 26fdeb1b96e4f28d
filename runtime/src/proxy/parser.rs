//! Parser role: extracts fields from raw input into a record

use super::{PluginBinding, PluginState, Role};
use crate::message::LogMessage;
use crate::preferences::Preferences;
use crate::python::class_loader::{MethodSpec, Operation};
use crate::python::marshal::{to_managed_string, MessageScope};
use crate::Result;
use pyo3::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserOp {
    Init,
    Process,
    Deinit,
}

impl Operation for ParserOp {
    const ALL: &'static [Self] = &[ParserOp::Init, ParserOp::Process, ParserOp::Deinit];

    fn spec(self) -> MethodSpec {
        match self {
            ParserOp::Init => MethodSpec::required("init", &[], "bool"),
            ParserOp::Process => MethodSpec::required("process", &["message", "input"], "bool"),
            ParserOp::Deinit => MethodSpec::optional("deinit", &[], "None"),
        }
    }
}

/// Parser role marker
pub struct Parser;

impl Role for Parser {
    const NAME: &'static str = "parser";
    type Op = ParserOp;

    const INIT: Option<ParserOp> = Some(ParserOp::Init);
    const DEINIT: Option<ParserOp> = Some(ParserOp::Deinit);
}

#[derive(Debug)]
pub struct ParserProxy {
    binding: PluginBinding<Parser>,
}

impl ParserProxy {
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

    /// Parse `input` into `msg`; false drops the record
    pub fn process(&mut self, msg: &mut LogMessage, input: &str) -> bool {
        let result = self.binding.call(ParserOp::Process, |py, method| {
            let scope = MessageScope::enter(py, msg)?;
            method
                .call1((scope.view(py), to_managed_string(py, input)))?
                .is_truthy()
        });
        let parsed = self.binding.recover(ParserOp::Process, result, false);
        self.binding.work_item_done();
        parsed
    }

    /// An independent instance built from a deep copy of this one's preferences
    pub fn duplicate(&self) -> Result<Self> {
        let mut preferences = Preferences::new();
        Preferences::clone_into(self.binding.preferences(), &mut preferences);
        Self::new(preferences)
    }

    pub fn state(&self) -> PluginState {
        self.binding.state()
    }

    pub fn binding(&self) -> &PluginBinding<Parser> {
        &self.binding
    }

    pub fn free(self) {
        self.binding.free()
    }
}
