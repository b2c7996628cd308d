//! `!ENV` directive
//!
//! Payload forms:
//! - `!ENV NAME` - a bare variable name
//! - `!ENV ${NAME:default}` - a name with a default (`${NAME}` has none)
//! - `!ENV [NAME_A, NAME_B, default]` - the first set variable wins; the last
//!   element is the default when the sequence has more than one element
//!
//! The process environment is only ever read.

use crate::error::{Error, Result};
use crate::value::Value;

const DIRECTIVE: &str = "!ENV";

/// A parsed `!ENV` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvReference {
    /// Variables to try, in order
    pub names: Vec<String>,
    /// Substituted when none of the variables is set
    pub default: Option<String>,
}

impl EnvReference {
    /// Parse a scalar payload: `NAME` or `${NAME:default}`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();

        let (name, default) = match text.strip_prefix("${") {
            Some(inner) => {
                let inner = inner.strip_suffix('}').ok_or_else(|| {
                    Error::invalid_directive(DIRECTIVE, format!("unclosed '${{' in '{}'", text))
                })?;
                match inner.split_once(':') {
                    Some((name, default)) => (name.trim(), Some(default.to_string())),
                    None => (inner.trim(), None),
                }
            }
            None => (text, None),
        };

        validate_name(name)?;
        Ok(Self {
            names: vec![name.to_string()],
            default,
        })
    }

    /// Parse a decoded payload: a scalar string or a sequence of names
    pub fn from_value(payload: &Value) -> Result<Self> {
        match payload {
            Value::String(s) => Self::parse(s),
            Value::Sequence(items) => Self::from_sequence(items),
            other => Err(Error::invalid_directive(
                DIRECTIVE,
                format!(
                    "expected a variable name or a sequence of names, got {}",
                    other.type_name()
                ),
            )),
        }
    }

    fn from_sequence(items: &[Value]) -> Result<Self> {
        let (names, default) = match items {
            [] => {
                return Err(Error::invalid_directive(
                    DIRECTIVE,
                    "sequence payload must not be empty",
                ))
            }
            [only] => (std::slice::from_ref(only), None),
            [names @ .., last] => (names, Some(scalar_text(last)?)),
        };

        let names = names
            .iter()
            .map(|item| {
                let name = item.as_str().ok_or_else(|| {
                    Error::invalid_directive(
                        DIRECTIVE,
                        format!("variable names must be strings, got {}", item.type_name()),
                    )
                })?;
                validate_name(name.trim())?;
                Ok(name.trim().to_string())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { names, default })
    }

    /// Look the variables up in the process environment
    ///
    /// Unset with no default is `Null`, or [`ErrorKind::EnvVariableUnset`]
    /// when `strict` is set.
    ///
    /// [`ErrorKind::EnvVariableUnset`]: crate::error::ErrorKind::EnvVariableUnset
    pub fn resolve(&self, strict: bool) -> Result<Value> {
        for name in &self.names {
            if let Ok(value) = std::env::var(name) {
                return Ok(Value::String(value));
            }
        }

        match &self.default {
            Some(default) => Ok(Value::String(default.clone())),
            None if strict => Err(Error::env_variable_unset(self.names.join(", "))),
            None => Ok(Value::Null),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_directive(DIRECTIVE, "variable name must not be empty"));
    }
    if name.contains('=') || name.contains('\0') {
        return Err(Error::invalid_directive(
            DIRECTIVE,
            format!("'{}' is not a valid variable name", name),
        ));
    }
    Ok(())
}

fn scalar_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Integer(_) | Value::Float(_) => Ok(value.to_string()),
        other => Err(Error::invalid_directive(
            DIRECTIVE,
            format!("default must be a scalar, got {}", other.type_name()),
        )),
    }
}
