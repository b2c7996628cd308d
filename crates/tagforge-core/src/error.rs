//! Error types for tagforge
//!
//! Every failure during a load or dump is a typed [`Error`]: a kind, the
//! location in the document tree, the source file position when known, and an
//! actionable help message. No partial tree is ever returned alongside one.

use std::fmt;

/// Result type alias for tagforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tagforge operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Path in the document where the error occurred (e.g., "services.db.port")
    pub path: Option<String>,
    /// Source location (file, line) if available
    pub source_location: Option<SourceLocation>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Location in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tag has no handler and the safety mode forbids falling back
    UnknownTag { tag: String },
    /// Record payload is missing required fields or carries unknown ones
    SchemaMismatch { record: String },
    /// The fetch capability could not produce bytes for an include target
    IncludeNotFound { target: String },
    /// An include target is already being resolved further up the stack
    IncludeCycle,
    /// An INHERIT ancestor is already being resolved further up the stack
    InheritCycle,
    /// Environment variable unset while strict env handling is on
    EnvVariableUnset { name: String },
    /// Template rendering failed
    Template,
    /// The format backend rejected the input
    FormatParse { format: String },
    /// A value has no representation in the target format
    UnsupportedDumpType { type_name: String },
    /// A directive payload (`!include`, `!ENV`, `INHERIT`) is malformed
    InvalidDirective { directive: String },
    /// Unknown format name or file extension
    UnsupportedFormat { format: String },
    /// I/O error while writing output
    Io,
    /// Internal error (bug in tagforge)
    Internal,
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            source_location: None,
            help: None,
            cause: None,
        }
    }

    /// Create an unknown tag error
    pub fn unknown_tag(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            help: Some(format!(
                "Register a handler for '!{}' or load in unsafe mode to keep the raw value",
                tag
            )),
            ..Self::new(ErrorKind::UnknownTag { tag })
        }
    }

    /// Create a schema mismatch error for record construction
    pub fn schema_mismatch(record: impl Into<String>, message: impl Into<String>) -> Self {
        let record = record.into();
        Self {
            help: Some(format!(
                "Check the fields of the '{}' record against its registered schema",
                record
            )),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::SchemaMismatch { record })
        }
    }

    /// Create an include not found error
    pub fn include_not_found(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            help: Some("Check that the include target exists relative to include_base_path".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::IncludeNotFound {
                target: target.into(),
            })
        }
    }

    /// Create an include cycle error
    pub fn include_cycle(chain: Vec<String>) -> Self {
        Self {
            help: Some("Break the cycle by removing one of the !include directives".into()),
            cause: Some(format!("Chain: {}", chain.join(" → "))),
            ..Self::new(ErrorKind::IncludeCycle)
        }
    }

    /// Create an inheritance cycle error
    pub fn inherit_cycle(chain: Vec<String>) -> Self {
        Self {
            help: Some("Break the cycle by removing one of the INHERIT entries".into()),
            cause: Some(format!("Chain: {}", chain.join(" → "))),
            ..Self::new(ErrorKind::InheritCycle)
        }
    }

    /// Create an unset environment variable error (strict env mode only)
    pub fn env_variable_unset(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            help: Some(format!(
                "Set the {} environment variable or provide a default: !ENV ${{{}:value}}",
                name, name
            )),
            ..Self::new(ErrorKind::EnvVariableUnset { name })
        }
    }

    /// Create a template rendering error
    pub fn template(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Template)
        }
    }

    /// Create a format parse error
    pub fn format_parse(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::FormatParse {
                format: format.into(),
            })
        }
    }

    /// Create an unsupported dump type error
    pub fn unsupported_dump_type(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            help: Some(format!(
                "Add a class mapping for '{}' to the dump options",
                type_name
            )),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::UnsupportedDumpType { type_name })
        }
    }

    /// Create an invalid directive error
    pub fn invalid_directive(directive: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::InvalidDirective {
                directive: directive.into(),
            })
        }
    }

    /// Create an unsupported format error
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self {
            help: Some("Supported formats: yaml, json, toml, ini".into()),
            ..Self::new(ErrorKind::UnsupportedFormat {
                format: format.into(),
            })
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Io)
        }
    }

    /// Create an internal error (bug in tagforge)
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            help: Some("This is likely a bug in tagforge. Please report it.".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Internal)
        }
    }

    /// Add path context to the error, keeping an existing deeper path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        if self.path.is_none() {
            let path = path.into();
            if !path.is_empty() {
                self.path = Some(path);
            }
        }
        self
    }

    /// Add source location to the error, keeping the innermost one
    pub fn with_source_location(mut self, loc: SourceLocation) -> Self {
        if self.source_location.is_none() {
            self.source_location = Some(loc);
        }
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::UnknownTag { tag } => write!(f, "Unknown tag: !{}", tag)?,
            ErrorKind::SchemaMismatch { record } => {
                write!(f, "Record '{}' does not match its schema", record)?
            }
            ErrorKind::IncludeNotFound { target } => write!(f, "Include not found: {}", target)?,
            ErrorKind::IncludeCycle => write!(f, "Include cycle detected")?,
            ErrorKind::InheritCycle => write!(f, "INHERIT cycle detected")?,
            ErrorKind::EnvVariableUnset { name } => {
                write!(f, "Environment variable not set: {}", name)?
            }
            ErrorKind::Template => write!(f, "Template error")?,
            ErrorKind::FormatParse { format } => write!(f, "Failed to parse {} data", format)?,
            ErrorKind::UnsupportedDumpType { type_name } => {
                write!(f, "Cannot dump value of type '{}'", type_name)?
            }
            ErrorKind::InvalidDirective { directive } => {
                write!(f, "Invalid {} directive", directive)?
            }
            ErrorKind::UnsupportedFormat { format } => write!(f, "Unsupported format: {}", format)?,
            ErrorKind::Io => write!(f, "I/O error")?,
            ErrorKind::Internal => write!(f, "Internal error")?,
        }

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(loc) = &self.source_location {
            write!(f, "\n  File: {}", loc.file)?;
            if let Some(line) = loc.line {
                write!(f, ":{}", line)?;
                if let Some(column) = loc.column {
                    write!(f, ":{}", column)?;
                }
            }
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
