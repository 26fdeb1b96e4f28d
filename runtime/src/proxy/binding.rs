//! Generic binding between one native proxy and one managed object

use super::Role;
use crate::message::LogMessage;
use crate::preferences::Preferences;
use crate::python::class_loader::{
    describe_exception, ClassHandle, ClassLoader, ManagedObject, Operation,
};
use crate::python::host::PluginHandle;
use crate::python::marshal::{from_managed_string, MessageScope};
use crate::python::runtime::{Runtime, RuntimeHandle};
use crate::{Error, Result};
use pyo3::prelude::*;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle state of a plugin instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Uninitialized,
    Initialized,
    Opened,
    Closed,
    Deinitialized,
}

/// One managed plugin object, its resolved class and a runtime reference
///
/// Field order matters: the managed object and class are released before
/// the runtime reference.
pub struct PluginBinding<R: Role> {
    object: Option<ManagedObject<R::Op>>,
    class: Option<ClassHandle<R::Op>>,
    preferences: Arc<Preferences>,
    instance_id: Uuid,
    state: PluginState,
    runtime: RuntimeHandle,
    _role: PhantomData<fn() -> R>,
}

impl<R: Role> PluginBinding<R> {
    /// Acquire the runtime, resolve the class and instantiate it
    pub fn new(preferences: impl Into<Arc<Preferences>>) -> Result<Self> {
        let preferences = preferences.into();
        if preferences.class_name().trim().is_empty() {
            tracing::error!(role = R::NAME, "Class name is not set");
            return Err(Error::ClassNotFound {
                class_name: String::new(),
                class_path: preferences.class_path().to_string(),
                reason: "class-name is not set".to_string(),
            });
        }

        let runtime = Runtime::global().acquire()?;
        let instance_id = Uuid::new_v4();
        let ctx = runtime.bind_current_thread();
        let (class, object) = ctx.run(|py| -> Result<_> {
            let class = ClassLoader::load::<R::Op>(
                py,
                &runtime,
                preferences.class_name(),
                preferences.class_path(),
            )?;
            R::validate(&class)?;
            let handle = Bound::new(
                py,
                PluginHandle::new(preferences.clone(), R::NAME, instance_id),
            )?;
            let object = class.instantiate(py, handle)?;
            Ok((class, object))
        })?;

        tracing::info!(
            role = R::NAME,
            class_name = preferences.class_name(),
            instance = %instance_id,
            "Plugin instance created"
        );
        Ok(Self {
            object: Some(object),
            class: Some(class),
            preferences,
            instance_id,
            state: PluginState::Uninitialized,
            runtime,
            _role: PhantomData,
        })
    }

    pub fn preferences(&self) -> &Arc<Preferences> {
        &self.preferences
    }

    pub fn class_name(&self) -> &str {
        self.preferences.class_name()
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Whether the managed class provides `op`
    pub fn has(&self, op: R::Op) -> bool {
        self.class.as_ref().is_some_and(|class| class.has(op))
    }

    /// Invoke the bound method for `op` with the GIL held
    ///
    /// Python exceptions raised inside `f` come back as [`Error::Call`].
    /// Only `init` may run on a deinitialized instance.
    pub fn call<T>(
        &self,
        op: R::Op,
        f: impl for<'py> FnOnce(Python<'py>, &Bound<'py, PyAny>) -> PyResult<T>,
    ) -> Result<T> {
        let spec = op.spec();
        let object = match self.object.as_ref() {
            Some(object) if self.state != PluginState::Deinitialized || R::INIT == Some(op) => {
                object
            }
            _ => {
                return Err(Error::InvalidState {
                    operation: spec.name,
                    state: format!("{:?}", self.state).to_lowercase(),
                })
            }
        };

        let ctx = self.runtime.bind_current_thread();
        ctx.run(|py| {
            let method = object.method(py, op).ok_or_else(|| Error::MethodNotFound {
                class_name: self.class_name().to_string(),
                method: spec.signature(),
            })?;
            f(py, method).map_err(|e| Error::Call {
                class_name: self.class_name().to_string(),
                method: spec.name.to_string(),
                reason: describe_exception(py, &e),
            })
        })
    }

    /// Call a no-argument method and take the truthiness of its result
    pub fn call_truthy(&self, op: R::Op) -> Result<bool> {
        self.call(op, |_, method| method.call0()?.is_truthy())
    }

    /// Call a no-argument method and discard its result
    pub fn call_unit(&self, op: R::Op) -> Result<()> {
        self.call(op, |_, method| method.call0().map(drop))
    }

    /// Call a no-argument method returning `str` or `None`
    pub fn call_text(&self, op: R::Op) -> Result<Option<String>> {
        self.call(op, |_, method| {
            method.call0().map(|value| from_managed_string(&value))
        })?
    }

    /// Lend `msg` to a one-argument method and take the truthiness of its result
    pub fn call_with_message(&self, op: R::Op, msg: &mut LogMessage) -> Result<bool> {
        self.call(op, |py, method| {
            let scope = MessageScope::enter(py, msg)?;
            method.call1((scope.view(py),))?.is_truthy()
        })
    }

    /// Turn a data-path failure into `fallback`, logging it
    pub fn recover<T>(&self, op: R::Op, result: Result<T>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) if e.is_call_failure() => {
                tracing::warn!(
                    role = R::NAME,
                    class_name = self.class_name(),
                    method = op.spec().name,
                    instance = %self.instance_id,
                    error = %e,
                    "Managed call failed"
                );
                fallback
            }
            Err(e) => {
                tracing::error!(
                    role = R::NAME,
                    class_name = self.class_name(),
                    method = op.spec().name,
                    instance = %self.instance_id,
                    error = %e,
                    "Managed call rejected"
                );
                fallback
            }
        }
    }

    /// Optional lifecycle call: absent methods count as success
    fn lifecycle(&self, op: Option<R::Op>, returns_status: bool) -> bool {
        let Some(op) = op.filter(|op| self.has(*op)) else {
            return true;
        };
        if returns_status {
            let result = self.call_truthy(op);
            self.recover(op, result, false)
        } else {
            let result = self.call_unit(op).map(|_| true);
            self.recover(op, result, false)
        }
    }

    /// Run the managed `init`; repeated calls on an initialized instance succeed
    pub fn init(&mut self) -> bool {
        match self.state {
            PluginState::Uninitialized | PluginState::Deinitialized => {
                if self.lifecycle(R::INIT, true) {
                    self.state = PluginState::Initialized;
                    true
                } else {
                    tracing::error!(
                        role = R::NAME,
                        class_name = self.class_name(),
                        "Plugin init failed"
                    );
                    false
                }
            }
            _ => true,
        }
    }

    /// Run the managed `open`; a failed open leaves the instance initialized
    pub fn open(&mut self) -> bool {
        match self.state {
            PluginState::Opened => true,
            PluginState::Initialized | PluginState::Closed => {
                let opened = self.lifecycle(R::OPEN, true);
                self.state = if opened {
                    PluginState::Opened
                } else {
                    PluginState::Initialized
                };
                opened
            }
            state => {
                tracing::warn!(
                    role = R::NAME,
                    class_name = self.class_name(),
                    state = ?state,
                    "open requested on an instance that is not initialized"
                );
                false
            }
        }
    }

    /// Run the managed `close` if the instance is open; otherwise a no-op
    pub fn close(&mut self) {
        if self.state == PluginState::Opened {
            self.lifecycle(R::CLOSE, false);
            self.state = PluginState::Closed;
        }
    }

    /// Close if needed, then run the managed `deinit`
    pub fn deinit(&mut self) {
        match self.state {
            PluginState::Uninitialized | PluginState::Deinitialized => {}
            _ => {
                self.close();
                self.lifecycle(R::DEINIT, false);
                self.state = PluginState::Deinitialized;
            }
        }
    }

    /// Managed `is_opened` where the role has one, the local state otherwise
    pub fn is_opened(&self) -> bool {
        if self.state == PluginState::Deinitialized {
            return false;
        }
        match R::IS_OPENED.filter(|op| self.has(*op)) {
            Some(op) => {
                let result = self.call_truthy(op);
                self.recover(op, result, false)
            }
            None => self.state == PluginState::Opened,
        }
    }

    /// Signal the end of one unit of work on the calling thread
    pub fn work_item_done(&self) {
        self.runtime.work_item_done();
    }

    /// Release the managed object, the class and the runtime reference
    pub fn free(self) {
        drop(self);
    }
}

impl<R: Role> Drop for PluginBinding<R> {
    fn drop(&mut self) {
        let object = self.object.take();
        let class = self.class.take();
        if object.is_some() || class.is_some() {
            Python::with_gil(|_py| {
                drop(object);
                drop(class);
            });
            tracing::debug!(
                role = R::NAME,
                class_name = self.preferences.class_name(),
                instance = %self.instance_id,
                "Plugin instance freed"
            );
        }
    }
}

impl<R: Role> std::fmt::Debug for PluginBinding<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginBinding")
            .field("role", &R::NAME)
            .field("class_name", &self.preferences.class_name())
            .field("instance_id", &self.instance_id)
            .field("state", &self.state)
            .finish()
    }
}
