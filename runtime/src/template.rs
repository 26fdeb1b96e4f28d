//! Log templates
//!
//! Destinations that only expose a text `send` method receive each record
//! formatted through a template such as `$ISODATE $HOST $MSG`.

use crate::message::{LogMessage, MESSAGE};
use crate::{Error, Result};
use chrono::SecondsFormat;
use regex::Regex;
use std::sync::OnceLock;

/// Template used by destinations when none is configured
pub const DEFAULT_TEMPLATE: &str = "$ISODATE $HOST $MSG";

fn macro_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:(\$)|\{([A-Za-z0-9_.\-]*)(\})?|([A-Za-z0-9_]+))")
            .expect("macro pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Element {
    Literal(String),
    Value(String),
    IsoDate,
    Tags,
}

impl Element {
    fn for_name(name: &str) -> Self {
        match name {
            "ISODATE" => Element::IsoDate,
            "TAGS" => Element::Tags,
            "MSG" => Element::Value(MESSAGE.to_string()),
            other => Element::Value(other.to_string()),
        }
    }
}

/// A compiled template
#[derive(Debug, Clone, PartialEq)]
pub struct LogTemplate {
    source: String,
    elements: Vec<Element>,
}

impl LogTemplate {
    /// Compile `source`, failing on an unterminated or empty `${...}` reference
    pub fn compile(source: &str) -> Result<Self> {
        let mut elements = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in macro_pattern().captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            literal.push_str(&source[last..whole.start()]);
            last = whole.end();

            if caps.get(1).is_some() {
                literal.push('$');
                continue;
            }

            let name = if let Some(braced) = caps.get(2) {
                if caps.get(3).is_none() || braced.as_str().is_empty() {
                    return Err(Error::Config(format!(
                        "invalid macro reference at offset {} in template '{}'",
                        whole.start(),
                        source
                    )));
                }
                braced.as_str()
            } else {
                caps.get(4).map(|m| m.as_str()).unwrap_or_default()
            };

            if !literal.is_empty() {
                elements.push(Element::Literal(std::mem::take(&mut literal)));
            }
            elements.push(Element::for_name(name));
        }

        literal.push_str(&source[last..]);
        if !literal.is_empty() {
            elements.push(Element::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            elements,
        })
    }

    /// The text this template was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Append the expansion of this template for `msg` to `out`
    pub fn format(&self, msg: &LogMessage, out: &mut String) {
        for element in &self.elements {
            match element {
                Element::Literal(text) => out.push_str(text),
                Element::Value(name) => out.push_str(msg.get_value(name).unwrap_or_default()),
                Element::IsoDate => {
                    out.push_str(&msg.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true))
                }
                Element::Tags => {
                    let tags: Vec<&str> = msg.tags().collect();
                    out.push_str(&tags.join(","));
                }
            }
        }
    }

    /// Expand this template for `msg` into a fresh string
    pub fn format_to_string(&self, msg: &LogMessage) -> String {
        let mut out = String::new();
        self.format(msg, &mut out);
        out
    }
}

impl Default for LogTemplate {
    fn default() -> Self {
        Self::compile(DEFAULT_TEMPLATE).expect("default template compiles")
    }
}
