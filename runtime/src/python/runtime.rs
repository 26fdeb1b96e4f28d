//! Embedded interpreter lifecycle
//!
//! One CPython interpreter serves every plugin instance in the process.
//! [`Runtime::global`] owns the bookkeeping around it: a reference count
//! driven by [`RuntimeHandle`] tokens, the start/stop state machine, the
//! search-path entries the bridge inserted, and the set of native threads
//! currently bound to the interpreter.
//!
//! Starting and stopping happen outside the state lock so that a thread
//! waiting for the GIL never holds it; concurrent acquirers park on a
//! condition variable while a transition is in flight.

use super::host;
use crate::config::RuntimeOptions;
use crate::{Error, Result};
use parking_lot::{Condvar, Mutex};
use pyo3::prelude::*;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Start state of the embedded runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    NotStarted,
    Starting,
    Started,
    Stopping,
    /// The last start attempt failed; the next acquire retries
    Failed,
}

struct Inner {
    state: RuntimeState,
    references: usize,
    options: RuntimeOptions,
    /// Search-path entries inserted by the bridge, removed on stop
    inserted_paths: Vec<String>,
    last_error: Option<String>,
}

/// Process-wide embedded runtime
pub struct Runtime {
    inner: Mutex<Inner>,
    transition: Condvar,
    attached: AtomicUsize,
    detach_after_work_item: AtomicBool,
}

thread_local! {
    static BINDING: ThreadBinding = ThreadBinding {
        bound: Cell::new(false),
        persistent: Cell::new(false),
    };
}

struct ThreadBinding {
    bound: Cell<bool>,
    persistent: Cell<bool>,
}

impl Drop for ThreadBinding {
    fn drop(&mut self) {
        if self.bound.get() {
            Runtime::global().attached.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Runtime {
    /// The single runtime of this process
    pub fn global() -> &'static Runtime {
        static RUNTIME: OnceLock<Runtime> = OnceLock::new();
        RUNTIME.get_or_init(|| {
            let options = RuntimeOptions::default();
            Runtime {
                detach_after_work_item: AtomicBool::new(options.detach_after_work_item),
                inner: Mutex::new(Inner {
                    state: RuntimeState::NotStarted,
                    references: 0,
                    options,
                    inserted_paths: Vec::new(),
                    last_error: None,
                }),
                transition: Condvar::new(),
                attached: AtomicUsize::new(0),
            }
        })
    }

    /// Replace the startup options; only allowed while the runtime is not running
    pub fn configure(&self, options: RuntimeOptions) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            RuntimeState::NotStarted | RuntimeState::Failed => {
                self.detach_after_work_item
                    .store(options.detach_after_work_item, Ordering::SeqCst);
                inner.options = options;
                Ok(())
            }
            state => Err(Error::Config(format!(
                "runtime options cannot change while the runtime is {:?}",
                state
            ))),
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.inner.lock().state
    }

    pub fn reference_count(&self) -> usize {
        self.inner.lock().references
    }

    /// Error message of the last failed start, if the runtime is in `Failed`
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Take a reference on the runtime, starting it on first use
    ///
    /// Must not be called while the calling thread holds the GIL.
    pub fn acquire(&'static self) -> Result<RuntimeHandle> {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                RuntimeState::Starting | RuntimeState::Stopping => {
                    self.transition.wait(&mut inner);
                }
                RuntimeState::Started => {
                    inner.references += 1;
                    return Ok(RuntimeHandle { runtime: self });
                }
                RuntimeState::NotStarted | RuntimeState::Failed => break,
            }
        }

        inner.state = RuntimeState::Starting;
        let options = inner.options.clone();
        drop(inner);

        tracing::debug!(
            python_path = ?options.python_path,
            startup_modules = ?options.startup_modules,
            "Starting embedded runtime"
        );
        let outcome = start(&options);

        let mut inner = self.inner.lock();
        let result = match outcome {
            Ok(inserted) => {
                inner.state = RuntimeState::Started;
                inner.references += 1;
                inner.inserted_paths = inserted;
                inner.last_error = None;
                tracing::info!("Embedded runtime started");
                Ok(RuntimeHandle { runtime: self })
            }
            Err(e) => {
                inner.state = RuntimeState::Failed;
                inner.last_error = Some(e.to_string());
                tracing::error!(error = %e, "Embedded runtime failed to start");
                Err(e)
            }
        };
        self.transition.notify_all();
        result
    }

    fn release(&self) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.references > 0, "runtime released more often than acquired");
        inner.references = inner.references.saturating_sub(1);
        if inner.references > 0 || inner.state != RuntimeState::Started {
            return;
        }

        inner.state = RuntimeState::Stopping;
        let inserted = std::mem::take(&mut inner.inserted_paths);
        drop(inner);

        if let Err(e) = Python::with_gil(|py| remove_search_paths(py, &inserted)) {
            tracing::warn!(error = %e, "Failed to restore interpreter search path");
        }

        let mut inner = self.inner.lock();
        inner.state = RuntimeState::NotStarted;
        self.transition.notify_all();
        tracing::info!("Embedded runtime stopped");
    }

    /// Make every entry of a `:`-separated class-path importable
    ///
    /// Entries are prepended to `sys.path` once and removed when the runtime stops.
    pub(crate) fn add_class_path(&self, py: Python<'_>, class_path: &str) -> PyResult<()> {
        let sys_path = py.import("sys")?.getattr("path")?;
        let mut added = false;

        for entry in std::env::split_paths(class_path) {
            let entry = entry.to_string_lossy().into_owned();
            if entry.is_empty() || sys_path.contains(&entry)? {
                continue;
            }
            sys_path.call_method1("insert", (0, &entry))?;
            self.inner.lock().inserted_paths.push(entry.clone());
            tracing::debug!(entry = %entry, "Added class-path entry");
            added = true;
        }

        if added {
            py.import("importlib")?.call_method0("invalidate_caches")?;
        }
        Ok(())
    }

    /// Bind the calling thread to the runtime; idempotent
    pub fn bind_current_thread(&self) -> ExecutionContext {
        BINDING.with(|binding| {
            if !binding.bound.replace(true) {
                let attached = self.attached.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::trace!(attached, "Thread attached to runtime");
            }
        });
        ExecutionContext {
            _thread_bound: PhantomData,
        }
    }

    /// Detach the calling thread if it was bound through
    /// [`bind_current_thread`](Self::bind_current_thread)
    pub fn unbind_current_thread(&self) {
        let _ = BINDING.try_with(|binding| {
            if binding.bound.replace(false) {
                let attached = self.attached.fetch_sub(1, Ordering::SeqCst) - 1;
                tracing::trace!(attached, "Thread detached from runtime");
            }
        });
    }

    /// Keep the calling thread attached across work items
    pub fn mark_current_thread_persistent(&self) -> ExecutionContext {
        BINDING.with(|binding| binding.persistent.set(true));
        self.bind_current_thread()
    }

    /// Called after one unit of work; detaches short-lived threads
    pub fn work_item_done(&self) {
        if !self.detach_after_work_item.load(Ordering::SeqCst) {
            return;
        }
        let persistent = BINDING
            .try_with(|binding| binding.persistent.get())
            .unwrap_or(true);
        if !persistent {
            self.unbind_current_thread();
        }
    }

    /// Whether the calling thread is currently bound
    pub fn is_current_thread_bound(&self) -> bool {
        BINDING
            .try_with(|binding| binding.bound.get())
            .unwrap_or(false)
    }

    /// Number of native threads currently bound
    pub fn attached_threads(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }
}

fn start(options: &RuntimeOptions) -> Result<Vec<String>> {
    if std::panic::catch_unwind(pyo3::prepare_freethreaded_python).is_err() {
        return Err(Error::RuntimeStart(
            "embedded interpreter could not be initialized".to_string(),
        ));
    }

    Python::with_gil(|py| -> PyResult<Vec<String>> {
        host::register(py)?;

        let sys_path = py.import("sys")?.getattr("path")?;
        let mut inserted = Vec::new();
        for dir in &options.python_path {
            let entry = dir.to_string_lossy().into_owned();
            if !sys_path.contains(&entry)? {
                sys_path.call_method1("append", (&entry,))?;
                inserted.push(entry);
            }
        }

        for module in &options.startup_modules {
            if let Err(e) = py.import(module.as_str()) {
                remove_search_paths(py, &inserted)?;
                return Err(e);
            }
        }
        Ok(inserted)
    })
    .map_err(|e| Error::RuntimeStart(e.to_string()))
}

fn remove_search_paths(py: Python<'_>, entries: &[String]) -> PyResult<()> {
    let sys_path = py.import("sys")?.getattr("path")?;
    for entry in entries {
        if sys_path.contains(entry)? {
            sys_path.call_method1("remove", (entry,))?;
        }
    }
    Ok(())
}

/// A counted reference on the global runtime
///
/// Cloning takes another reference; dropping releases one. The runtime
/// stops when the last handle goes away.
pub struct RuntimeHandle {
    runtime: &'static Runtime,
}

impl RuntimeHandle {
    /// Release this reference explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl Clone for RuntimeHandle {
    fn clone(&self) -> Self {
        self.runtime.inner.lock().references += 1;
        Self {
            runtime: self.runtime,
        }
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        self.runtime.release();
    }
}

impl std::ops::Deref for RuntimeHandle {
    type Target = Runtime;

    fn deref(&self) -> &Runtime {
        self.runtime
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("state", &self.runtime.state())
            .finish()
    }
}

/// Proof that the current thread is bound to the runtime
///
/// Not `Send`: a binding belongs to the thread that made it.
pub struct ExecutionContext {
    _thread_bound: PhantomData<*const ()>,
}

impl ExecutionContext {
    /// Cross into the interpreter
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: for<'py> FnOnce(Python<'py>) -> R,
    {
        Python::with_gil(f)
    }
}
