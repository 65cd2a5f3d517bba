//! The (de)serialization contract the core consumes.
//!
//! The core is agnostic to which concrete format a caller selects; it only
//! ever parses what a backend read and stringifies what a caller stores.

use crate::error::Result;

/// Options shared by all formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    pub pretty: bool,
}

/// Parse/stringify hook between raw backend bytes and structured data.
pub trait Format: Send + Sync {
    fn name(&self) -> &str;
    fn parse(&self, raw: &str, options: &FormatOptions) -> Result<serde_json::Value>;
    fn stringify(&self, data: &serde_json::Value, options: &FormatOptions) -> Result<String>;
}

/// Built-in JSON format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Format for Json {
    fn name(&self) -> &str {
        "json"
    }

    fn parse(&self, raw: &str, _options: &FormatOptions) -> Result<serde_json::Value> {
        if raw.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(raw)?)
    }

    fn stringify(&self, data: &serde_json::Value, options: &FormatOptions) -> Result<String> {
        Ok(if options.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        })
    }
}
