//! Type converter hooks
//!
//! Converters coerce a value toward an expected [`FieldShape`]. Record
//! construction consults them for fields whose shape does not match, and
//! `!ENV` substitutions run through the [`FieldShape::Any`] converter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::record::FieldShape;
use crate::value::Value;

/// A coercion function; `None` means "cannot convert"
pub type Converter = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Mapping from target shape to coercion function
#[derive(Clone, Default)]
pub struct TypeConverters {
    converters: HashMap<FieldShape, Converter>,
}

impl TypeConverters {
    /// Create an empty converter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Converters that type strings by YAML scalar rules
    /// (`"8080"` → 8080, `"true"` → true, `"~"` → null)
    pub fn yaml_scalars() -> Self {
        let mut converters = Self::new();
        converters.register(FieldShape::Any, |v| Some(retype_scalar(v)));
        converters.register(FieldShape::Integer, |v| {
            Some(retype_scalar(v)).filter(Value::is_integer)
        });
        converters.register(FieldShape::Float, |v| match retype_scalar(v) {
            Value::Integer(i) => Some(Value::Float(i as f64)),
            f @ Value::Float(_) => Some(f),
            _ => None,
        });
        converters.register(FieldShape::Bool, |v| {
            Some(retype_scalar(v)).filter(Value::is_bool)
        });
        converters.register(FieldShape::String, |v| match v {
            Value::Bool(_) | Value::Integer(_) | Value::Float(_) => Some(Value::String(v.to_string())),
            _ => None,
        });
        converters
    }

    /// Register a converter for a shape, replacing any previous one
    pub fn register<F>(&mut self, shape: FieldShape, func: F)
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.converters.insert(shape, Arc::new(func));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<F>(mut self, shape: FieldShape, func: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.register(shape, func);
        self
    }

    /// Check if a converter is registered for a shape
    pub fn contains(&self, shape: FieldShape) -> bool {
        self.converters.contains_key(&shape)
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Run the converter for `shape`, if any
    pub fn convert(&self, shape: FieldShape, value: &Value) -> Option<Value> {
        self.converters.get(&shape).and_then(|f| f(value))
    }
}

impl fmt::Debug for TypeConverters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut shapes: Vec<String> = self.converters.keys().map(|s| s.to_string()).collect();
        shapes.sort();
        f.debug_struct("TypeConverters")
            .field("shapes", &shapes)
            .finish()
    }
}

/// Re-type a string scalar the way a YAML plain scalar would load.
/// Non-strings, and strings that would load as collections, are unchanged.
fn retype_scalar(value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    match serde_yaml::from_str::<serde_yaml::Value>(s) {
        Ok(serde_yaml::Value::Null) => Value::Null,
        Ok(serde_yaml::Value::Bool(b)) => Value::Bool(b),
        Ok(serde_yaml::Value::Number(n)) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map(Value::Float).unwrap_or_else(|| value.clone()),
        },
        _ => value.clone(),
    }
}
