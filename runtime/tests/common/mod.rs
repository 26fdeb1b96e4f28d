//! Shared helpers for integration tests
//!
//! Plugin classes are written as Python modules into a temporary directory
//! that serves as their class-path. Module names must be unique per test
//! because the interpreter caches imports process-wide.

#![allow(dead_code)]

use logbridge_runtime::Preferences;
use pyo3::prelude::*;
use std::path::Path;
use tempfile::TempDir;

pub struct PluginDir {
    dir: TempDir,
}

impl PluginDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create plugin dir"),
        }
    }

    /// Write `<module>.py` into the directory
    pub fn module(self, module: &str, source: &str) -> Self {
        std::fs::write(self.dir.path().join(format!("{}.py", module)), source)
            .expect("write plugin module");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn class_path(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    pub fn preferences(&self, class_name: &str) -> Preferences {
        Preferences::for_class(class_name).with_class_path(self.class_path())
    }
}

/// Read a module-level attribute of an already imported plugin module
pub fn module_attr<T>(module: &str, attr: &str) -> T
where
    T: for<'py> FromPyObject<'py>,
{
    Python::with_gil(|py| {
        py.import(module)
            .and_then(|m| m.getattr(attr))
            .and_then(|value| value.extract())
            .expect("read module attribute")
    })
}
