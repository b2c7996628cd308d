//! Universal format interface
//!
//! Dispatches `load`/`dump` to YAML, JSON, TOML or INI, chosen explicitly or
//! by file extension. YAML goes through the full resolution pipeline; the
//! other formats carry no tags but still honor `INHERIT` and templates.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::{Error, Result, SourceLocation};
use crate::ini;
use crate::parser::{LoadOptions, Parser};
use crate::record::Record;
use crate::value::Value;

/// A supported document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Yaml,
    Json,
    Toml,
    Ini,
}

impl Format {
    /// Guess the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Format::Yaml),
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            "ini" | "cfg" => Some(Format::Ini),
            _ => None,
        }
    }

    /// Guess the format from a path's extension
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    fn label(&self) -> &'static str {
        match self {
            Format::Yaml => "YAML",
            Format::Json => "JSON",
            Format::Toml => "TOML",
            Format::Ini => "INI",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Yaml => write!(f, "yaml"),
            Format::Json => write!(f, "json"),
            Format::Toml => write!(f, "toml"),
            Format::Ini => write!(f, "ini"),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Format::from_extension(s.trim()).ok_or_else(|| Error::unsupported_format(s.trim()))
    }
}

/// How to pick the format of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatMode {
    /// Sniff the file extension
    #[default]
    Auto,
    Explicit(Format),
}

impl FormatMode {
    /// Resolve to a concrete format for `path`
    pub fn resolve(&self, path: &Path) -> Result<Format> {
        match self {
            FormatMode::Explicit(format) => Ok(*format),
            FormatMode::Auto => Format::from_path(path).ok_or_else(|| {
                Error::unsupported_format(path.display().to_string()).with_help(
                    "Could not determine the format from the file extension; \
                     use .yaml, .yml, .json, .toml, .ini or .cfg, or pass the format explicitly",
                )
            }),
        }
    }
}

impl FromStr for FormatMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(FormatMode::Auto)
        } else {
            s.parse().map(FormatMode::Explicit)
        }
    }
}

impl From<Format> for FormatMode {
    fn from(format: Format) -> Self {
        FormatMode::Explicit(format)
    }
}

/// How a record type is represented when dumped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpShape {
    /// Fields as a mapping
    Mapping,
    /// Field values in declaration order
    Sequence,
    /// `!<tag> {fields}`, reloadable through the same registry (YAML only)
    Tagged,
}

/// Options controlling a dump
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Record type name to dump shape
    pub class_mappings: HashMap<String, DumpShape>,
    /// JSON indentation width; 0 writes compact JSON
    pub indent: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            class_mappings: HashMap::new(),
            indent: 2,
        }
    }
}

impl DumpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a record type to a dump shape
    pub fn with_class_mapping(mut self, type_name: impl Into<String>, shape: DumpShape) -> Self {
        self.class_mappings.insert(type_name.into(), shape);
        self
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    fn shape_for(&self, record: &Record, format: Format) -> Result<DumpShape> {
        let shape = self.class_mappings.get(&record.type_name).copied().ok_or_else(|| {
            Error::unsupported_dump_type(
                &record.type_name,
                format!("records of type '{}' have no class mapping", record.type_name),
            )
        })?;
        if shape == DumpShape::Tagged && format != Format::Yaml {
            return Err(Error::unsupported_dump_type(
                &record.type_name,
                format!("tagged records cannot be written as {}", format.label()),
            )
            .with_help("Use DumpShape::Mapping or DumpShape::Sequence for non-YAML output"));
        }
        Ok(shape)
    }

    /// Replace records with their mapped plain shape
    fn lower(&self, value: &Value, format: Format) -> Result<Value> {
        Ok(match value {
            Value::Sequence(items) => Value::Sequence(
                items
                    .iter()
                    .map(|item| self.lower(item, format))
                    .collect::<Result<_>>()?,
            ),
            Value::Mapping(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.lower(v, format)?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Record(record) => match self.shape_for(record, format)? {
                DumpShape::Mapping | DumpShape::Tagged => Value::Mapping(
                    record
                        .fields
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), self.lower(v, format)?)))
                        .collect::<Result<_>>()?,
                ),
                DumpShape::Sequence => Value::Sequence(
                    record
                        .fields
                        .values()
                        .map(|v| self.lower(v, format))
                        .collect::<Result<_>>()?,
                ),
            },
            scalar => scalar.clone(),
        })
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Load a document from a string
pub fn load(text: &str, format: Format, options: &LoadOptions) -> Result<Value> {
    Parser::new(options.clone()).load_str_as(text, format)
}

/// Load a document from a file
pub fn load_file(path: impl AsRef<Path>, mode: FormatMode, options: &LoadOptions) -> Result<Value> {
    let path = path.as_ref();
    let format = mode.resolve(path)?;
    Parser::new(options.clone()).load_file_as(path, format)
}

/// Parse a tag-free format straight into a value tree
pub(crate) fn parse_untagged(text: &str, format: Format, source: Option<&str>) -> Result<Value> {
    let file = source.unwrap_or("<string>").to_string();
    match format {
        Format::Json => {
            let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
                Error::format_parse("JSON", e.to_string()).with_source_location(SourceLocation {
                    file,
                    line: Some(e.line()),
                    column: Some(e.column()),
                })
            })?;
            Ok(Value::from(parsed))
        }
        Format::Toml => {
            let parsed: toml::Table = toml::from_str(text).map_err(|e| {
                let line = e.span().map(|span| line_of(text, span.start));
                Error::format_parse("TOML", e.message().to_string()).with_source_location(
                    SourceLocation {
                        file,
                        line,
                        column: None,
                    },
                )
            })?;
            Ok(Value::from(toml::Value::Table(parsed)))
        }
        Format::Ini => {
            let sections = ini::parse(text).map_err(|e| {
                Error::format_parse("INI", e.to_string()).with_source_location(SourceLocation {
                    file,
                    line: Some(e.line()),
                    column: None,
                })
            })?;
            Ok(Value::Mapping(
                sections
                    .into_iter()
                    .map(|(name, entries)| {
                        let entries = entries
                            .into_iter()
                            .map(|(k, v)| (k, Value::String(v)))
                            .collect();
                        (name, Value::Mapping(entries))
                    })
                    .collect(),
            ))
        }
        Format::Yaml => Err(Error::internal("YAML must be parsed by the tag-aware parser")),
    }
}

fn line_of(text: &str, offset: usize) -> usize {
    text.get(..offset)
        .map(|prefix| prefix.matches('\n').count() + 1)
        .unwrap_or(1)
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Mapping(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<toml::Value> for Value {
    fn from(toml: toml::Value) -> Self {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Integer(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            toml::Value::Table(table) => {
                Value::Mapping(table.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

// =============================================================================
// Dumping
// =============================================================================

/// Serialize a value tree
pub fn dump(value: &Value, format: Format, options: &DumpOptions) -> Result<String> {
    log::trace!("Dumping {} value as {}", value.type_name(), format);
    match format {
        Format::Yaml => {
            let yaml = to_yaml(value, options)?;
            serde_yaml::to_string(&yaml)
                .map_err(|e| Error::internal(format!("Failed to write YAML: {}", e)))
        }
        Format::Json => dump_json(&options.lower(value, format)?, options.indent),
        Format::Toml => dump_toml(&options.lower(value, format)?),
        Format::Ini => dump_ini(&options.lower(value, format)?),
    }
}

/// Serialize a value tree to a file
pub fn dump_file(
    value: &Value,
    path: impl AsRef<Path>,
    mode: FormatMode,
    options: &DumpOptions,
) -> Result<()> {
    let path = path.as_ref();
    let format = mode.resolve(path)?;
    let text = dump(value, format, options)?;
    log::debug!("Writing {} as {}", path.display(), format);
    std::fs::write(path, text)
        .map_err(|e| Error::io(format!("Failed to write {}: {}", path.display(), e)))
}

fn to_yaml(value: &Value, options: &DumpOptions) -> Result<serde_yaml::Value> {
    Ok(match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Integer(i) => serde_yaml::Value::Number((*i).into()),
        Value::Float(f) => serde_yaml::Value::Number((*f).into()),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Sequence(items) => serde_yaml::Value::Sequence(
            items
                .iter()
                .map(|item| to_yaml(item, options))
                .collect::<Result<_>>()?,
        ),
        Value::Mapping(map) => yaml_mapping(map, options)?,
        Value::Record(record) => match options.shape_for(record, Format::Yaml)? {
            DumpShape::Mapping => yaml_mapping(&record.fields, options)?,
            DumpShape::Sequence => serde_yaml::Value::Sequence(
                record
                    .fields
                    .values()
                    .map(|v| to_yaml(v, options))
                    .collect::<Result<_>>()?,
            ),
            DumpShape::Tagged => {
                serde_yaml::Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: serde_yaml::value::Tag::new(record.tag.as_str()),
                    value: yaml_mapping(&record.fields, options)?,
                }))
            }
        },
    })
}

fn yaml_mapping(map: &IndexMap<String, Value>, options: &DumpOptions) -> Result<serde_yaml::Value> {
    let mut out = serde_yaml::Mapping::with_capacity(map.len());
    for (k, v) in map {
        out.insert(serde_yaml::Value::String(k.clone()), to_yaml(v, options)?);
    }
    Ok(serde_yaml::Value::Mapping(out))
}

fn to_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| {
                Error::unsupported_dump_type("float", format!("{} has no JSON representation", f))
                    .with_help("JSON cannot hold NaN or infinity; dump to YAML or TOML instead")
            })?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<Result<_>>()?)
        }
        Value::Mapping(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
                .collect::<Result<_>>()?,
        ),
        Value::Record(record) => {
            return Err(Error::internal(format!(
                "record '{}' reached the JSON writer unlowered",
                record.type_name
            )))
        }
    })
}

fn dump_json(value: &Value, indent: usize) -> Result<String> {
    use serde::Serialize;

    let json = to_json(value)?;
    if indent == 0 {
        return serde_json::to_string(&json)
            .map_err(|e| Error::internal(format!("Failed to write JSON: {}", e)));
    }

    let indent = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    json.serialize(&mut serializer)
        .map_err(|e| Error::internal(format!("Failed to write JSON: {}", e)))?;
    String::from_utf8(buf).map_err(|e| Error::internal(format!("JSON output is not UTF-8: {}", e)))
}

fn to_toml(value: &Value, path: &str) -> Result<toml::Value> {
    Ok(match value {
        Value::Null => {
            return Err(Error::unsupported_dump_type("null", "TOML has no null value")
                .with_path(path)
                .with_help("Remove the key or give it a value before dumping to TOML"))
        }
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::Integer(i) => toml::Value::Integer(*i),
        Value::Float(f) => toml::Value::Float(*f),
        Value::String(s) => toml::Value::String(s.clone()),
        Value::Sequence(items) => toml::Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| to_toml(item, &format!("{}[{}]", path, i)))
                .collect::<Result<_>>()?,
        ),
        Value::Mapping(map) => {
            let mut table = toml::Table::new();
            for (k, v) in map {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", path, k)
                };
                table.insert(k.clone(), to_toml(v, &child)?);
            }
            toml::Value::Table(table)
        }
        Value::Record(record) => {
            return Err(Error::internal(format!(
                "record '{}' reached the TOML writer unlowered",
                record.type_name
            )))
        }
    })
}

fn dump_toml(value: &Value) -> Result<String> {
    let toml::Value::Table(table) = to_toml(value, "")? else {
        return Err(Error::unsupported_dump_type(
            value.type_name(),
            "a TOML document must be a mapping",
        )
        .with_help("Wrap the value in a top-level mapping"));
    };
    toml::to_string(&table).map_err(|e| Error::internal(format!("Failed to write TOML: {}", e)))
}

fn dump_ini(value: &Value) -> Result<String> {
    let structure_error = || {
        Error::unsupported_dump_type(value.type_name(), "INI format requires a mapping of mappings")
            .with_help("Nest every key under a section: {section: {key: value}}")
    };

    let Value::Mapping(root) = value else {
        return Err(structure_error());
    };

    let mut sections = ini::Sections::new();
    for (name, section) in root {
        let Value::Mapping(entries) = section else {
            return Err(structure_error().with_path(name.as_str()));
        };
        let mut out = IndexMap::with_capacity(entries.len());
        for (key, entry) in entries {
            let text = match entry {
                Value::Null => String::new(),
                Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => {
                    entry.to_string()
                }
                other => {
                    return Err(Error::unsupported_dump_type(
                        other.type_name(),
                        "INI values must be scalars",
                    )
                    .with_help("Flatten nested values or dump to YAML, JSON or TOML")
                    .with_path(format!("{}.{}", name, key)))
                }
            };
            out.insert(key.clone(), text);
        }
        sections.insert(name.clone(), out);
    }
    Ok(ini::write(&sections))
}
