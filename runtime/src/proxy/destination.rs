//! Destination role: a managed sink for log records
//!
//! A destination class provides `send_message(message)`, `send(text)`, or
//! both. The structured form wins when present; otherwise each record is
//! formatted through the configured template and sent as text.

use super::{PluginBinding, PluginState, Role};
use crate::message::LogMessage;
use crate::preferences::Preferences;
use crate::python::class_loader::{ClassHandle, MethodSpec, Operation};
use crate::python::marshal::to_managed_string;
use crate::template::LogTemplate;
use crate::{Error, Result};
use pyo3::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationOp {
    Init,
    Deinit,
    Open,
    Close,
    IsOpened,
    OnMessageQueueEmpty,
    Send,
    SendMessage,
}

impl Operation for DestinationOp {
    const ALL: &'static [Self] = &[
        DestinationOp::Init,
        DestinationOp::Deinit,
        DestinationOp::Open,
        DestinationOp::Close,
        DestinationOp::IsOpened,
        DestinationOp::OnMessageQueueEmpty,
        DestinationOp::Send,
        DestinationOp::SendMessage,
    ];

    fn spec(self) -> MethodSpec {
        match self {
            DestinationOp::Init => MethodSpec::required("init", &[], "bool"),
            DestinationOp::Deinit => MethodSpec::required("deinit", &[], "None"),
            DestinationOp::Open => MethodSpec::required("open", &[], "bool"),
            DestinationOp::Close => MethodSpec::required("close", &[], "None"),
            DestinationOp::IsOpened => MethodSpec::required("is_opened", &[], "bool"),
            DestinationOp::OnMessageQueueEmpty => {
                MethodSpec::required("on_message_queue_empty", &[], "None")
            }
            DestinationOp::Send => MethodSpec::optional("send", &["text"], "bool"),
            DestinationOp::SendMessage => {
                MethodSpec::optional("send_message", &["message"], "bool")
            }
        }
    }
}

/// Destination role marker
pub struct Destination;

impl Role for Destination {
    const NAME: &'static str = "destination";
    type Op = DestinationOp;

    const INIT: Option<DestinationOp> = Some(DestinationOp::Init);
    const DEINIT: Option<DestinationOp> = Some(DestinationOp::Deinit);
    const OPEN: Option<DestinationOp> = Some(DestinationOp::Open);
    const CLOSE: Option<DestinationOp> = Some(DestinationOp::Close);
    const IS_OPENED: Option<DestinationOp> = Some(DestinationOp::IsOpened);

    fn validate(class: &ClassHandle<DestinationOp>) -> Result<()> {
        if class.has(DestinationOp::Send) || class.has(DestinationOp::SendMessage) {
            return Ok(());
        }
        tracing::error!(
            class_name = class.class_name(),
            "Destination class provides neither send_message(message) nor send(text)"
        );
        Err(Error::MethodNotFound {
            class_name: class.class_name().to_string(),
            method: format!(
                "{} or {}",
                DestinationOp::SendMessage.spec(),
                DestinationOp::Send.spec()
            ),
        })
    }
}

/// Native side of a managed destination
#[derive(Debug)]
pub struct DestinationProxy {
    binding: PluginBinding<Destination>,
    template: LogTemplate,
    formatted: String,
}

impl DestinationProxy {
    pub fn new(preferences: impl Into<Arc<Preferences>>, template: LogTemplate) -> Result<Self> {
        let binding = PluginBinding::new(preferences)?;
        if !binding.has(DestinationOp::SendMessage) {
            tracing::debug!(
                class_name = binding.class_name(),
                template = template.source(),
                "Destination sends formatted text"
            );
        }
        Ok(Self {
            binding,
            template,
            formatted: String::new(),
        })
    }

    pub fn init(&mut self) -> bool {
        self.binding.init()
    }

    pub fn open(&mut self) -> bool {
        self.binding.open()
    }

    pub fn close(&mut self) {
        self.binding.close()
    }

    pub fn deinit(&mut self) {
        self.binding.deinit()
    }

    pub fn is_opened(&self) -> bool {
        self.binding.is_opened()
    }

    /// Whether records go out through `send_message` rather than `send`
    pub fn sends_structured(&self) -> bool {
        self.binding.has(DestinationOp::SendMessage)
    }

    pub fn template(&self) -> &LogTemplate {
        &self.template
    }

    /// Deliver one record; false tells the pipeline to retry or drop it
    pub fn send(&mut self, msg: &mut LogMessage) -> bool {
        let sent = if self.sends_structured() {
            let result = self
                .binding
                .call_with_message(DestinationOp::SendMessage, msg);
            self.binding
                .recover(DestinationOp::SendMessage, result, false)
        } else {
            self.formatted.clear();
            self.template.format(msg, &mut self.formatted);
            let text = self.formatted.as_str();
            let result = self.binding.call(DestinationOp::Send, |py, method| {
                method.call1((to_managed_string(py, text),))?.is_truthy()
            });
            self.binding.recover(DestinationOp::Send, result, false)
        };
        self.binding.work_item_done();
        sent
    }

    /// Tell the managed side the queue drained so it can flush batches
    pub fn on_message_queue_empty(&mut self) {
        let result = self.binding.call_unit(DestinationOp::OnMessageQueueEmpty);
        self.binding
            .recover(DestinationOp::OnMessageQueueEmpty, result, ());
    }

    pub fn state(&self) -> PluginState {
        self.binding.state()
    }

    pub fn binding(&self) -> &PluginBinding<Destination> {
        &self.binding
    }

    pub fn free(self) {
        self.binding.free()
    }
}
