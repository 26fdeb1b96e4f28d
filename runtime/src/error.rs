//! Error types for the logbridge runtime

use thiserror::Error;

/// Result type alias for logbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while bridging the pipeline into the embedded interpreter
#[derive(Error, Debug)]
pub enum Error {
    /// The embedded interpreter could not be started
    #[error("Runtime start error: {0}")]
    RuntimeStart(String),

    /// The managed class could not be resolved under the given class-path
    #[error("Class not found: {class_name} (class-path: {class_path}): {reason}")]
    ClassNotFound {
        class_name: String,
        class_path: String,
        reason: String,
    },

    /// A required method is absent or has an incompatible signature
    #[error("Method not found in {class_name}: {method}")]
    MethodNotFound { class_name: String, method: String },

    /// The managed constructor raised or produced no object
    #[error("Can't create object of {class_name}: {reason}")]
    Instantiation { class_name: String, reason: String },

    /// A single invocation of a managed method failed
    #[error("Call to {class_name}.{method} failed: {reason}")]
    Call {
        class_name: String,
        method: String,
        reason: String,
    },

    /// A record or value could not be converted across the boundary
    #[error("Marshaling error: {0}")]
    Marshal(String),

    /// A proxy operation was requested in a lifecycle state that forbids it
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Interpreter error outside of a plugin call
    #[error("Python error: {0}")]
    Python(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True for errors that only invalidate one call, not the plugin instance
    pub fn is_call_failure(&self) -> bool {
        matches!(self, Error::Call { .. } | Error::Marshal(_))
    }
}

impl From<pyo3::PyErr> for Error {
    fn from(err: pyo3::PyErr) -> Self {
        Error::Python(err.to_string())
    }
}
