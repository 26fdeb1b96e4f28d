//! Native log record
//!
//! The pipeline hands these to proxies; the marshaller exposes them to
//! managed code as a live `logbridge.LogMessage` view for the span of one call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the message body value
pub const MESSAGE: &str = "MESSAGE";

/// Name of the originating host value
pub const HOST: &str = "HOST";

/// A log record: name-value pairs, tags and a receive timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    values: BTreeMap<String, String>,
    tags: BTreeSet<String>,
    timestamp: DateTime<Utc>,
}

impl Default for LogMessage {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            tags: BTreeSet::new(),
            timestamp: Utc::now(),
        }
    }
}

impl LogMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record whose `MESSAGE` value is `text`
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new().with_value(MESSAGE, text)
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_value(name, value);
        self
    }

    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn unset_value(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn clear_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }

    /// True when the record carries no values and no tags
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.tags.is_empty()
    }
}
