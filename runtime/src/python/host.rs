//! The `logbridge` host module
//!
//! Managed plugin classes import `logbridge` to reach back into the native
//! side. The module is created in-process when the runtime starts and lives
//! in `sys.modules`; it exports:
//!
//! - `PluginHandle`: the opaque handle every plugin constructor receives
//! - `get_option(handle, key)`: option lookup for a plugin instance
//! - `LogMessage`: the live view over a native record
//! - `internal_message(level, text)`: managed-side diagnostics into `tracing`

use super::marshal::PyLogMessage;
use crate::preferences::Preferences;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::sync::Arc;
use uuid::Uuid;

/// Name under which the host module is importable
pub const MODULE_NAME: &str = "logbridge";

/// Native handle passed to the constructor of each managed plugin object
#[pyclass(name = "PluginHandle", module = "logbridge", frozen)]
pub struct PluginHandle {
    preferences: Arc<Preferences>,
    role: &'static str,
    instance_id: Uuid,
}

impl PluginHandle {
    pub(crate) fn new(
        preferences: Arc<Preferences>,
        role: &'static str,
        instance_id: Uuid,
    ) -> Self {
        Self {
            preferences,
            role,
            instance_id,
        }
    }
}

#[pymethods]
impl PluginHandle {
    /// Value of a configured option, or None when unset
    fn get_option(&self, key: &str) -> Option<String> {
        self.preferences.get_option(key).map(str::to_owned)
    }

    #[getter]
    fn class_name(&self) -> String {
        self.preferences.class_name().to_string()
    }

    #[getter]
    fn class_path(&self) -> String {
        self.preferences.class_path().to_string()
    }

    #[getter]
    fn role(&self) -> &'static str {
        self.role
    }

    #[getter]
    fn instance_id(&self) -> String {
        self.instance_id.to_string()
    }

    /// All options as a dict keyed by normalized names
    fn options<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        for (key, value) in self.preferences.options() {
            dict.set_item(key, value)?;
        }
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "PluginHandle(role='{}', class_name='{}', instance_id='{}')",
            self.role,
            self.preferences.class_name(),
            self.instance_id
        )
    }
}

/// Option lookup callback: `logbridge.get_option(handle, key)`
#[pyfunction]
fn get_option(handle: &Bound<'_, PluginHandle>, key: &str) -> Option<String> {
    handle.get().get_option(key)
}

/// Emit a diagnostic from managed code through the native logger
#[pyfunction]
fn internal_message(level: &str, text: &str) -> PyResult<()> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => tracing::trace!(target: "logbridge::managed", "{}", text),
        "debug" => tracing::debug!(target: "logbridge::managed", "{}", text),
        "info" => tracing::info!(target: "logbridge::managed", "{}", text),
        "warn" | "warning" => tracing::warn!(target: "logbridge::managed", "{}", text),
        "error" | "critical" => tracing::error!(target: "logbridge::managed", "{}", text),
        other => {
            return Err(PyValueError::new_err(format!(
                "unknown log level '{}'",
                other
            )))
        }
    }
    Ok(())
}

/// Install the host module into `sys.modules` unless it is already there
pub(crate) fn register(py: Python<'_>) -> PyResult<()> {
    let modules = py.import("sys")?.getattr("modules")?;
    if modules.contains(MODULE_NAME)? {
        return Ok(());
    }

    let module = PyModule::new(py, MODULE_NAME)?;
    module.add_class::<PluginHandle>()?;
    module.add_class::<PyLogMessage>()?;
    module.add_function(wrap_pyfunction!(get_option, &module)?)?;
    module.add_function(wrap_pyfunction!(internal_message, &module)?)?;
    modules.set_item(MODULE_NAME, &module)?;

    tracing::debug!("Registered host module '{}'", MODULE_NAME);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn handle_prefs() -> Arc<Preferences> {
        Arc::new(
            Preferences::for_class("demo.Filter")
                .with_class_path("/plugins")
                .with_option("min-level", "warning"),
        )
    }

    #[test]
    fn test_option_callback_normalizes_keys() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            register(py).unwrap();
            let handle = Bound::new(
                py,
                PluginHandle::new(handle_prefs(), "filter", Uuid::new_v4()),
            )
            .unwrap();

            let locals = PyDict::new(py);
            locals.set_item("handle", &handle).unwrap();
            let code = CString::new(
                "import logbridge\n\
                 a = logbridge.get_option(handle, 'min-level')\n\
                 b = handle.get_option('min_level')\n\
                 c = handle.get_option('missing')\n\
                 d = handle.options()\n\
                 e = handle.class_path",
            )
            .unwrap();
            py.run(&code, None, Some(&locals)).unwrap();

            let get = |name: &str| locals.get_item(name).unwrap().unwrap();
            assert_eq!(get("a").extract::<String>().unwrap(), "warning");
            assert_eq!(get("b").extract::<String>().unwrap(), "warning");
            assert!(get("c").is_none());
            assert_eq!(
                get("d").get_item("min_level").unwrap().extract::<String>().unwrap(),
                "warning"
            );
            assert_eq!(get("e").extract::<String>().unwrap(), "/plugins");
        });
    }

    #[test]
    fn test_internal_message_rejects_unknown_level() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            register(py).unwrap();
            let module = py.import(MODULE_NAME).unwrap();
            assert!(module
                .call_method1("internal_message", ("info", "hello"))
                .is_ok());
            assert!(module
                .call_method1("internal_message", ("loud", "hello"))
                .is_err());
        });
    }

    #[test]
    fn test_register_is_idempotent() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            register(py).unwrap();
            let first = py.import(MODULE_NAME).unwrap().unbind();
            register(py).unwrap();
            let second = py.import(MODULE_NAME).unwrap();
            assert_eq!(first.as_ptr(), second.as_ptr());
        });
    }
}
