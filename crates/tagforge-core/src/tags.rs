//! Tag registry
//!
//! Maps tag names (without the leading `!`) to handlers. A handler is either
//! a transformation function over the decoded payload or a record schema.
//! Registries are created empty; nothing is registered implicitly and no
//! registry is shared globally.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use crate::convert::TypeConverters;
use crate::error::{Error, Result};
use crate::record::RecordSchema;
use crate::value::Value;

/// A transformation handler: decoded payload in, substitute value out
pub type TagFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// What a registered tag does with its payload
#[derive(Clone)]
pub enum TagHandler {
    /// Transform the payload with a function
    Function(TagFn),
    /// Validate the payload against a schema and build a record
    Record(RecordSchema),
}

impl TagHandler {
    /// Invoke the handler on an already-decoded payload
    pub fn apply(&self, tag: &str, payload: Value, converters: &TypeConverters) -> Result<Value> {
        match self {
            TagHandler::Function(func) => func(payload),
            TagHandler::Record(schema) => schema.build(tag, payload, converters).map(Value::Record),
        }
    }
}

impl fmt::Debug for TagHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagHandler::Function(_) => write!(f, "Function(..)"),
            TagHandler::Record(schema) => write!(f, "Record({})", schema.name()),
        }
    }
}

/// Registry of tag handlers, in registration order
#[derive(Clone, Default, Debug)]
pub struct TagRegistry {
    handlers: IndexMap<String, TagHandler>,
}

impl TagRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in transformation tags
    /// (`!json`, `!base64`, `!split`)
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_tags();
        registry
    }

    fn register_builtin_tags(&mut self) {
        self.insert("json", TagHandler::Function(Arc::new(json_tag)));
        self.insert("base64", TagHandler::Function(Arc::new(base64_tag)));
        self.insert("split", TagHandler::Function(Arc::new(split_tag)));
    }

    fn insert(&mut self, tag: &str, handler: TagHandler) {
        if self.handlers.insert(tag.to_string(), handler).is_some() {
            log::debug!("Tag !{} re-registered, previous handler replaced", tag);
        }
    }

    /// Register a transformation function for a tag
    ///
    /// A leading `!` on the name is ignored. Re-registering a tag replaces its
    /// handler and keeps its original position in [`list_tags`](Self::list_tags).
    pub fn register<F>(&mut self, tag: &str, func: F) -> Result<()>
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        let tag = normalize_tag(tag)?;
        self.insert(tag, TagHandler::Function(Arc::new(func)));
        Ok(())
    }

    /// Register a record type
    ///
    /// When `tag` is `None` the tag is the lowercased type name. Returns the
    /// tag the schema was registered under.
    pub fn register_record(&mut self, schema: RecordSchema, tag: Option<&str>) -> Result<String> {
        let tag = match tag {
            Some(tag) => normalize_tag(tag)?.to_string(),
            None => {
                let derived = schema.default_tag();
                normalize_tag(&derived)?.to_string()
            }
        };
        self.insert(&tag, TagHandler::Record(schema));
        Ok(tag)
    }

    /// Get the handler for a tag
    pub fn get(&self, tag: &str) -> Option<&TagHandler> {
        self.handlers.get(tag.strip_prefix('!').unwrap_or(tag))
    }

    /// Check if a tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// All registered tag names, in registration order
    pub fn list_tags(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn normalize_tag(tag: &str) -> Result<&str> {
    let name = tag.strip_prefix('!').unwrap_or(tag);
    if name.is_empty() {
        return Err(Error::invalid_directive("tag registration", "tag name must not be empty"));
    }
    Ok(name)
}

// =============================================================================
// Built-in transformation tags
// =============================================================================

/// Helper: Truncate string for error messages
fn truncate_str(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

fn string_payload<'a>(tag: &str, payload: &'a Value) -> Result<&'a str> {
    payload.as_str().ok_or_else(|| {
        Error::invalid_directive(
            format!("!{}", tag),
            format!("expected a string payload, got {}", payload.type_name()),
        )
    })
}

/// `!json` - parse a JSON string payload
fn json_tag(payload: Value) -> Result<Value> {
    let text = string_payload("json", &payload)?;
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        Error::format_parse(
            "JSON",
            format!(
                "Invalid JSON at line {}, column {}: {}\nInput preview: {}",
                e.line(),
                e.column(),
                e,
                truncate_str(text, 50)
            ),
        )
    })?;
    Ok(Value::from(parsed))
}

/// `!base64` - decode a base64 payload to a UTF-8 string
fn base64_tag(payload: Value) -> Result<Value> {
    use base64::{engine::general_purpose, Engine as _};

    let encoded = string_payload("base64", &payload)?.trim();
    let decoded = general_purpose::STANDARD.decode(encoded).map_err(|e| {
        Error::invalid_directive(
            "!base64",
            format!("Invalid base64: {}\nInput preview: {}", e, truncate_str(encoded, 50)),
        )
    })?;
    String::from_utf8(decoded)
        .map(Value::String)
        .map_err(|_| Error::invalid_directive("!base64", "decoded payload is not valid UTF-8"))
}

/// `!split` - split a string payload on commas into trimmed items
fn split_tag(payload: Value) -> Result<Value> {
    let text = string_payload("split", &payload)?;
    if text.trim().is_empty() {
        return Ok(Value::Sequence(Vec::new()));
    }
    Ok(Value::Sequence(
        text.split(',')
            .map(|s| Value::String(s.trim().to_string()))
            .collect(),
    ))
}
