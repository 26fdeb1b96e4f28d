//! Python integration module
//!
//! This module provides:
//! 1. The embedded interpreter lifecycle and thread binding
//! 2. The `logbridge` host module imported by plugin classes
//! 3. Class resolution and typed method lookup
//! 4. Record and string marshaling across the boundary

pub mod class_loader;
pub mod host;
pub mod marshal;
pub mod runtime;

pub use class_loader::{ClassHandle, ClassLoader, ManagedObject, MethodSpec, Operation, Requirement};
pub use host::{PluginHandle, MODULE_NAME};
pub use marshal::{from_managed_string, to_managed_string, MessageScope, PyLogMessage};
pub use runtime::{ExecutionContext, Runtime, RuntimeHandle, RuntimeState};
