//! Record tags
//!
//! A record tag binds a YAML tag to a declared field schema. Construction is
//! validate-then-build: the tagged mapping is checked against the schema and
//! turned into a [`Record`], an opaque node of the resolved tree.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

use crate::convert::TypeConverters;
use crate::error::{Error, Result};
use crate::value::Value;

/// A structured value built from a record tag
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Declared type name (e.g., "Person")
    pub type_name: String,
    /// Tag the record was loaded from, without the leading `!`
    pub tag: String,
    /// Field values in schema declaration order
    pub fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new(
        type_name: impl Into<String>,
        tag: impl Into<String>,
        fields: IndexMap<String, Value>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            tag: tag.into(),
            fields,
        }
    }

    /// Get a field by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.type_name)?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, ")")
    }
}

// Records serialize as their field mapping so `Value::into_typed` can target
// plain structs.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Expected shape of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShape {
    Any,
    String,
    Integer,
    /// Accepts integers as well as floats
    Float,
    Bool,
    Sequence,
    Mapping,
}

impl FieldShape {
    /// Check whether a value already has this shape
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldShape::Any => true,
            FieldShape::String => value.is_string(),
            FieldShape::Integer => value.is_integer(),
            FieldShape::Float => value.is_float() || value.is_integer(),
            FieldShape::Bool => value.is_bool(),
            FieldShape::Sequence => value.is_sequence(),
            FieldShape::Mapping => value.is_mapping() || value.is_record(),
        }
    }
}

impl fmt::Display for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldShape::Any => "any",
            FieldShape::String => "string",
            FieldShape::Integer => "integer",
            FieldShape::Float => "float",
            FieldShape::Bool => "boolean",
            FieldShape::Sequence => "sequence",
            FieldShape::Mapping => "mapping",
        };
        write!(f, "{}", name)
    }
}

/// Declaration of a single record field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub shape: FieldShape,
    pub required: bool,
    /// Filled in when an optional field is absent
    pub default: Option<Value>,
}

impl FieldSpec {
    /// A field that must be present in every payload
    pub fn required(name: impl Into<String>, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: true,
            default: None,
        }
    }

    /// A field that may be omitted
    pub fn optional(name: impl Into<String>, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: false,
            default: None,
        }
    }

    /// Set the value used when the field is absent
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Field schema of a registrable record type
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl RecordSchema {
    /// Start a schema for the named type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    /// The declared type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared fields, in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Tag used when none is given at registration: the lowercased type name
    pub fn default_tag(&self) -> String {
        self.name.to_lowercase()
    }

    /// Validate a tagged payload and build the record
    pub fn build(&self, tag: &str, payload: Value, converters: &TypeConverters) -> Result<Record> {
        let mut given = match payload {
            Value::Mapping(map) => map,
            Value::Null if self.fields.iter().all(|f| !f.required) => IndexMap::new(),
            other => {
                return Err(Error::schema_mismatch(
                    &self.name,
                    format!("expected a mapping of fields, got {}", other.type_name()),
                ))
            }
        };

        let unknown: Vec<&str> = given
            .keys()
            .filter(|k| !self.fields.iter().any(|f| &f.name == *k))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(Error::schema_mismatch(
                &self.name,
                format!("unknown field(s): {}", unknown.join(", ")),
            ));
        }

        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required && !given.contains_key(&f.name))
            .map(|f| f.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::schema_mismatch(
                &self.name,
                format!("missing required field(s): {}", missing.join(", ")),
            ));
        }

        let mut fields = IndexMap::with_capacity(self.fields.len());
        for spec in &self.fields {
            let value = match given.shift_remove(&spec.name) {
                Some(value) => value,
                None => match &spec.default {
                    Some(default) => default.clone(),
                    None => continue,
                },
            };

            let value = if spec.shape.matches(&value) {
                value
            } else {
                match converters.convert(spec.shape, &value) {
                    Some(converted) if spec.shape.matches(&converted) => converted,
                    _ => {
                        return Err(Error::schema_mismatch(
                            &self.name,
                            format!(
                                "field '{}' expects {}, got {}",
                                spec.name,
                                spec.shape,
                                value.type_name()
                            ),
                        ))
                    }
                }
            };
            fields.insert(spec.name.clone(), value);
        }

        Ok(Record::new(&self.name, tag, fields))
    }
}
