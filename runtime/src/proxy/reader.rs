//! Reader role: a managed source of log records

use super::{PluginBinding, PluginState, Role};
use crate::message::LogMessage;
use crate::preferences::Preferences;
use crate::python::class_loader::{MethodSpec, Operation};
use crate::python::marshal::to_managed_string;
use crate::Result;
use pyo3::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderOp {
    Init,
    Deinit,
    Open,
    Close,
    IsOpened,
    IsReadable,
    Fetch,
    GetBookmark,
    SeekToBookmark,
    GetNameByUniqOptions,
}

impl Operation for ReaderOp {
    const ALL: &'static [Self] = &[
        ReaderOp::Init,
        ReaderOp::Deinit,
        ReaderOp::Open,
        ReaderOp::Close,
        ReaderOp::IsOpened,
        ReaderOp::IsReadable,
        ReaderOp::Fetch,
        ReaderOp::GetBookmark,
        ReaderOp::SeekToBookmark,
        ReaderOp::GetNameByUniqOptions,
    ];

    fn spec(self) -> MethodSpec {
        match self {
            ReaderOp::Init => MethodSpec::required("init", &[], "bool"),
            ReaderOp::Deinit => MethodSpec::required("deinit", &[], "None"),
            ReaderOp::Open => MethodSpec::required("open", &[], "bool"),
            ReaderOp::Close => MethodSpec::required("close", &[], "None"),
            ReaderOp::IsOpened => MethodSpec::required("is_opened", &[], "bool"),
            ReaderOp::IsReadable => MethodSpec::required("is_readable", &[], "bool"),
            ReaderOp::Fetch => MethodSpec::required("fetch", &["message"], "bool"),
            ReaderOp::GetBookmark => MethodSpec::required("get_bookmark", &[], "str"),
            ReaderOp::SeekToBookmark => {
                MethodSpec::required("seek_to_bookmark", &["bookmark"], "bool")
            }
            ReaderOp::GetNameByUniqOptions => {
                MethodSpec::required("get_name_by_uniq_options", &[], "str")
            }
        }
    }
}

/// Reader role marker
pub struct Reader;

impl Role for Reader {
    const NAME: &'static str = "reader";
    type Op = ReaderOp;

    const INIT: Option<ReaderOp> = Some(ReaderOp::Init);
    const DEINIT: Option<ReaderOp> = Some(ReaderOp::Deinit);
    const OPEN: Option<ReaderOp> = Some(ReaderOp::Open);
    const CLOSE: Option<ReaderOp> = Some(ReaderOp::Close);
    const IS_OPENED: Option<ReaderOp> = Some(ReaderOp::IsOpened);
}

/// Native side of a managed reader
#[derive(Debug)]
pub struct ReaderProxy {
    binding: PluginBinding<Reader>,
}

impl ReaderProxy {
    pub fn new(preferences: impl Into<Arc<Preferences>>) -> Result<Self> {
        Ok(Self {
            binding: PluginBinding::new(preferences)?,
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

    pub fn is_readable(&self) -> bool {
        let result = self.binding.call_truthy(ReaderOp::IsReadable);
        self.binding.recover(ReaderOp::IsReadable, result, false)
    }

    /// Let the managed reader fill `msg`; true when a record was produced
    pub fn fetch(&mut self, msg: &mut LogMessage) -> bool {
        let result = self.binding.call_with_message(ReaderOp::Fetch, msg);
        let fetched = self.binding.recover(ReaderOp::Fetch, result, false);
        self.binding.work_item_done();
        fetched
    }

    /// Current position, for persisting and resuming later
    pub fn get_bookmark(&self) -> Option<String> {
        let result = self.binding.call_text(ReaderOp::GetBookmark);
        self.binding.recover(ReaderOp::GetBookmark, result, None)
    }

    pub fn seek_to_bookmark(&mut self, bookmark: &str) -> bool {
        let result = self.binding.call(ReaderOp::SeekToBookmark, |py, method| {
            method
                .call1((to_managed_string(py, bookmark),))?
                .is_truthy()
        });
        self.binding.recover(ReaderOp::SeekToBookmark, result, false)
    }

    /// Stable identity string used to deduplicate readers across reloads
    pub fn get_name_by_uniq_options(&self) -> Option<String> {
        let result = self.binding.call_text(ReaderOp::GetNameByUniqOptions);
        self.binding
            .recover(ReaderOp::GetNameByUniqOptions, result, None)
    }

    pub fn state(&self) -> PluginState {
        self.binding.state()
    }

    pub fn binding(&self) -> &PluginBinding<Reader> {
        &self.binding
    }

    pub fn free(self) {
        self.binding.free()
    }
}
