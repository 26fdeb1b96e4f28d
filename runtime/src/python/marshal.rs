//! Record and string marshaling between the pipeline and Python.
//!
//! This module provides:
//! - `PyLogMessage`: a live `logbridge.LogMessage` view over a native record
//! - `MessageScope`: lends a record to that view for the span of one call
//! - Python `str` / `None` → Rust `Option<String>`
//! - Rust `&str` → Python `str`

use crate::message::LogMessage;
use crate::{Error, Result};
use parking_lot::Mutex;
use pyo3::exceptions::{PyKeyError, PyRuntimeError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyString};
use std::sync::Arc;

type Slot = Arc<Mutex<Option<LogMessage>>>;

/// Python-facing view of a log record
///
/// The record is only reachable while the bridge call that created the view
/// is running. Afterwards every accessor raises `RuntimeError`.
#[pyclass(name = "LogMessage", module = "logbridge", frozen)]
pub struct PyLogMessage {
    slot: Slot,
}

impl PyLogMessage {
    fn with_record<R>(&self, f: impl FnOnce(&mut LogMessage) -> R) -> PyResult<R> {
        let mut guard = self.slot.lock();
        match guard.as_mut() {
            Some(record) => Ok(f(record)),
            None => Err(PyRuntimeError::new_err(
                "LogMessage is no longer valid outside of the call it was passed to",
            )),
        }
    }
}

#[pymethods]
impl PyLogMessage {
    fn get_value(&self, name: &str) -> PyResult<Option<String>> {
        self.with_record(|msg| msg.get_value(name).map(str::to_owned))
    }

    fn set_value(&self, name: &str, value: &str) -> PyResult<()> {
        self.with_record(|msg| msg.set_value(name, value))
    }

    /// Remove a value, returning the previous one
    fn unset_value(&self, name: &str) -> PyResult<Option<String>> {
        self.with_record(|msg| msg.unset_value(name))
    }

    /// Snapshot of all values as a dict
    fn values<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let values = self.with_record(|msg| msg.values().clone())?;
        let dict = PyDict::new(py);
        for (name, value) in values {
            dict.set_item(name, value)?;
        }
        Ok(dict)
    }

    fn has_tag(&self, tag: &str) -> PyResult<bool> {
        self.with_record(|msg| msg.has_tag(tag))
    }

    fn set_tag(&self, tag: &str) -> PyResult<()> {
        self.with_record(|msg| msg.set_tag(tag))
    }

    fn clear_tag(&self, tag: &str) -> PyResult<bool> {
        self.with_record(|msg| msg.clear_tag(tag))
    }

    fn tags(&self) -> PyResult<Vec<String>> {
        self.with_record(|msg| msg.tags().map(str::to_owned).collect())
    }

    /// Receive time as seconds since the epoch
    fn timestamp(&self) -> PyResult<f64> {
        self.with_record(|msg| msg.timestamp().timestamp_micros() as f64 / 1_000_000.0)
    }

    fn __getitem__(&self, name: &str) -> PyResult<String> {
        self.with_record(|msg| msg.get_value(name).map(str::to_owned))?
            .ok_or_else(|| PyKeyError::new_err(name.to_string()))
    }

    fn __setitem__(&self, name: &str, value: &str) -> PyResult<()> {
        self.set_value(name, value)
    }

    fn __contains__(&self, name: &str) -> PyResult<bool> {
        self.with_record(|msg| msg.get_value(name).is_some())
    }

    fn __repr__(&self) -> String {
        match self.slot.lock().as_ref() {
            Some(msg) => format!(
                "LogMessage({} values, {} tags)",
                msg.values().len(),
                msg.tags().count()
            ),
            None => "LogMessage(<detached>)".to_string(),
        }
    }
}

/// A record lent to Python for one call
///
/// Entering moves the record into the view; dropping the scope moves it back
/// and detaches the view, whatever way the call ended.
pub struct MessageScope<'a> {
    record: &'a mut LogMessage,
    slot: Slot,
    view: Py<PyLogMessage>,
}

impl<'a> MessageScope<'a> {
    pub fn enter(py: Python<'_>, record: &'a mut LogMessage) -> PyResult<Self> {
        let slot: Slot = Arc::new(Mutex::new(Some(std::mem::take(record))));
        match Py::new(py, PyLogMessage { slot: slot.clone() }) {
            Ok(view) => Ok(Self { record, slot, view }),
            Err(e) => {
                if let Some(msg) = slot.lock().take() {
                    *record = msg;
                }
                Err(e)
            }
        }
    }

    /// The Python object to pass as the `message` argument
    pub fn view<'py>(&self, py: Python<'py>) -> &Bound<'py, PyLogMessage> {
        self.view.bind(py)
    }
}

impl Drop for MessageScope<'_> {
    fn drop(&mut self) {
        if let Some(msg) = self.slot.lock().take() {
            *self.record = msg;
        }
    }
}

/// Convert a managed return value into an owned string
///
/// `None` means "no value"; anything other than `str` is a marshaling error.
pub fn from_managed_string(obj: &Bound<'_, PyAny>) -> Result<Option<String>> {
    if obj.is_none() {
        return Ok(None);
    }
    let text = obj.downcast::<PyString>().map_err(|_| {
        let type_name = obj
            .get_type()
            .name()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        Error::Marshal(format!("expected str or None, got {}", type_name))
    })?;
    let text = text
        .to_cow()
        .map_err(|e| Error::Marshal(format!("string is not valid UTF-8: {}", e)))?;
    Ok(Some(text.into_owned()))
}

/// Convert a native string into a Python `str`
pub fn to_managed_string<'py>(py: Python<'py>, text: &str) -> Bound<'py, PyString> {
    PyString::new(py, text)
}
