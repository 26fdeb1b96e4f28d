//! logbridge runtime - plugin bridge between a native log pipeline and embedded Python
//!
//! This crate lets the pipeline delegate its roles to classes living in an
//! in-process CPython interpreter:
//! - Readers, destinations, filters, template functions and parsers
//! - One shared, reference-counted interpreter per process
//! - Per-thread binding released after each unit of work
//! - Records lent to Python as live views for the span of one call
//!
//! Plugin classes import the `logbridge` host module for option lookup,
//! diagnostics and the `LogMessage` type.

#![warn(clippy::all)]

pub mod config;
pub mod message;
pub mod preferences;
pub mod proxy;
pub mod python;
pub mod template;

mod error;
pub use error::{Error, Result};

pub use config::{Config, LoggingConfig, PluginConfig, PluginRole, RuntimeOptions};
pub use message::LogMessage;
pub use preferences::Preferences;
pub use proxy::{
    DestinationProxy, FilterNode, FilterProxy, ParserProxy, PluginInstance, PluginState,
    ReaderProxy, TemplateFunctionProxy,
};
pub use python::{Runtime, RuntimeHandle, RuntimeState};
pub use template::LogTemplate;

use tracing_subscriber::EnvFilter;

/// Initialize logging with the default configuration
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() -> Result<()> {
    init_with(&LoggingConfig::default())
}

/// Initialize logging from a [`LoggingConfig`]
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_with(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!("logbridge runtime initialized");
    }
    Ok(())
}
