//! Class resolution and method lookup
//!
//! A role declares its managed methods as a closed set of [`Operation`]s.
//! [`ClassLoader::load`] resolves the class once, checks every operation
//! against it, and hands back a [`ClassHandle`] that knows which optional
//! operations exist. Instantiation binds the methods on the new object so
//! the data path never looks a method up again.

use super::host::PluginHandle;
use super::runtime::Runtime;
use crate::{Error, Result};
use pyo3::prelude::*;
use pyo3::types::PyTracebackMethods;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Whether a class must provide a method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// Name and shape of one managed method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub returns: &'static str,
    pub requirement: Requirement,
}

impl MethodSpec {
    pub const fn required(
        name: &'static str,
        params: &'static [&'static str],
        returns: &'static str,
    ) -> Self {
        Self {
            name,
            params,
            returns,
            requirement: Requirement::Required,
        }
    }

    pub const fn optional(
        name: &'static str,
        params: &'static [&'static str],
        returns: &'static str,
    ) -> Self {
        Self {
            name,
            params,
            returns,
            requirement: Requirement::Optional,
        }
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }

    /// Rendered form used in diagnostics, e.g. `fetch(message) -> bool`
    pub fn signature(&self) -> String {
        format!("{}({}) -> {}", self.name, self.params.join(", "), self.returns)
    }
}

impl fmt::Display for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Logical operation of a role, mapped onto one managed method
pub trait Operation: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every operation of the role, in resolution order
    const ALL: &'static [Self];

    fn spec(self) -> MethodSpec;
}

/// A resolved managed class
pub struct ClassHandle<O: Operation> {
    class_name: String,
    class_path: String,
    class: Py<PyAny>,
    resolved: HashSet<O>,
}

impl<O: Operation> ClassHandle<O> {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn class_path(&self) -> &str {
        &self.class_path
    }

    /// Whether the class provides `op`
    pub fn has(&self, op: O) -> bool {
        self.resolved.contains(&op)
    }

    /// Call the constructor with the native handle as its only argument
    pub fn instantiate(
        &self,
        py: Python<'_>,
        handle: Bound<'_, PluginHandle>,
    ) -> Result<ManagedObject<O>> {
        let instantiation_error = |reason: String| {
            tracing::error!(
                class_name = %self.class_name,
                reason = %reason,
                "Can't create object"
            );
            Error::Instantiation {
                class_name: self.class_name.clone(),
                reason,
            }
        };

        let instance = self
            .class
            .bind(py)
            .call1((handle,))
            .map_err(|e| instantiation_error(describe_exception(py, &e)))?;
        if instance.is_none() {
            return Err(instantiation_error("constructor returned None".to_string()));
        }

        let mut methods = HashMap::with_capacity(self.resolved.len());
        for &op in O::ALL.iter().filter(|op| self.resolved.contains(op)) {
            let method = instance
                .getattr(op.spec().name)
                .map_err(|e| instantiation_error(describe_exception(py, &e)))?;
            methods.insert(op, method.unbind());
        }

        Ok(ManagedObject { methods })
    }
}

impl<O: Operation> fmt::Debug for ClassHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassHandle")
            .field("class_name", &self.class_name)
            .field("class_path", &self.class_path)
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// A managed plugin object, held through its bound methods
pub struct ManagedObject<O: Operation> {
    methods: HashMap<O, Py<PyAny>>,
}

impl<O: Operation> ManagedObject<O> {
    /// Bound method for `op`, or None if the class does not provide it
    pub fn method<'py>(&self, py: Python<'py>, op: O) -> Option<&Bound<'py, PyAny>> {
        self.methods.get(&op).map(|method| method.bind(py))
    }
}

/// Resolves managed classes by dotted name
pub struct ClassLoader;

impl ClassLoader {
    /// Resolve `class_name` under `class_path` and check it against `O`
    pub fn load<O: Operation>(
        py: Python<'_>,
        runtime: &Runtime,
        class_name: &str,
        class_path: &str,
    ) -> Result<ClassHandle<O>> {
        let class = resolve_class(py, runtime, class_name, class_path).map_err(|reason| {
            tracing::error!(
                class_name,
                class_path,
                reason = %reason,
                "Can't find class"
            );
            Error::ClassNotFound {
                class_name: class_name.to_string(),
                class_path: class_path.to_string(),
                reason,
            }
        })?;

        let inspect = py.import("inspect")?;
        let mut resolved = HashSet::new();
        for &op in O::ALL {
            let spec = op.spec();
            let found = match check_method(py, &inspect, &class, &spec) {
                Ok(found) => found,
                Err(e) => {
                    tracing::debug!(
                        class_name,
                        method = spec.name,
                        error = %e,
                        "Method check raised"
                    );
                    false
                }
            };

            if found {
                resolved.insert(op);
            } else if spec.is_required() {
                tracing::error!(
                    class_name,
                    class_path,
                    method = %spec.signature(),
                    "Can't find method in class"
                );
                return Err(Error::MethodNotFound {
                    class_name: class_name.to_string(),
                    method: spec.signature(),
                });
            } else {
                tracing::debug!(class_name, method = spec.name, "Optional method absent");
            }
        }

        tracing::info!(class_name, class_path, "Loaded managed class");
        Ok(ClassHandle {
            class_name: class_name.to_string(),
            class_path: class_path.to_string(),
            class: class.unbind(),
            resolved,
        })
    }
}

fn resolve_class<'py>(
    py: Python<'py>,
    runtime: &Runtime,
    class_name: &str,
    class_path: &str,
) -> std::result::Result<Bound<'py, PyAny>, String> {
    let (module_name, attr) = class_name
        .rsplit_once('.')
        .filter(|(module, attr)| !module.is_empty() && !attr.is_empty())
        .ok_or_else(|| format!("'{}' is not of the form module.Class", class_name))?;

    runtime
        .add_class_path(py, class_path)
        .map_err(|e| describe_exception(py, &e))?;

    let module = py
        .import(module_name)
        .map_err(|e| describe_exception(py, &e))?;
    let class = module
        .getattr(attr)
        .map_err(|e| describe_exception(py, &e))?;

    let is_class = py
        .import("inspect")
        .and_then(|inspect| inspect.call_method1("isclass", (&class,)))
        .and_then(|flag| flag.is_truthy())
        .map_err(|e| describe_exception(py, &e))?;
    if !is_class {
        return Err(format!("'{}' is not a class", class_name));
    }
    Ok(class)
}

/// Whether `class` provides `spec` with a compatible positional arity
fn check_method(
    py: Python<'_>,
    inspect: &Bound<'_, PyModule>,
    class: &Bound<'_, PyAny>,
    spec: &MethodSpec,
) -> PyResult<bool> {
    if !class.hasattr(spec.name)? {
        return Ok(false);
    }
    let attr = class.getattr(spec.name)?;
    if !attr.is_callable() {
        return Ok(false);
    }

    // Plain functions fetched from the class still expect `self`
    let builtins = py.import("builtins")?;
    let receiver = match inspect.call_method1("getattr_static", (class, spec.name)) {
        Ok(raw) => {
            let unbound = raw.is_instance(&builtins.getattr("staticmethod")?)?
                || raw.is_instance(&builtins.getattr("classmethod")?)?;
            if unbound {
                0
            } else {
                1
            }
        }
        Err(_) => 1,
    };

    let signature = match inspect.call_method1("signature", (&attr,)) {
        Ok(signature) => signature,
        Err(_) => return Ok(true),
    };
    let empty = inspect.getattr("Parameter")?.getattr("empty")?;

    let mut positional = 0usize;
    let mut required_positional = 0usize;
    let mut var_positional = false;
    let mut required_keyword = 0usize;
    for param in signature
        .getattr("parameters")?
        .call_method0("values")?
        .try_iter()?
    {
        let param = param?;
        let kind: String = param.getattr("kind")?.getattr("name")?.extract()?;
        let has_default = param.getattr("default")?.as_ptr() != empty.as_ptr();
        match kind.as_str() {
            "POSITIONAL_ONLY" | "POSITIONAL_OR_KEYWORD" => {
                positional += 1;
                if !has_default {
                    required_positional += 1;
                }
            }
            "VAR_POSITIONAL" => var_positional = true,
            "KEYWORD_ONLY" if !has_default => required_keyword += 1,
            _ => {}
        }
    }

    let supplied = receiver + spec.params.len();
    Ok(required_positional <= supplied
        && (var_positional || positional >= supplied)
        && required_keyword == 0)
}

/// One-line description of a Python exception, with its traceback at debug level
pub(crate) fn describe_exception(py: Python<'_>, err: &PyErr) -> String {
    if let Some(traceback) = err.traceback(py).and_then(|tb| tb.format().ok()) {
        tracing::debug!(traceback = %traceback, "Python traceback");
    }
    err.to_string()
}
