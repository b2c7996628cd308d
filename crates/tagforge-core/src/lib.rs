//! tagforge-core: tag-aware configuration document loading
//!
//! Loads YAML (and JSON, TOML, INI) configuration documents into a [`Value`]
//! tree, resolving directives along the way:
//!
//! - `!include path` splices in another document (or a glob of them)
//! - `!ENV NAME` / `!ENV ${NAME:default}` reads environment variables
//! - custom tags dispatch to functions or record schemas in a [`TagRegistry`]
//! - a top-level `INHERIT` key deep-merges ancestor documents beneath the
//!   document
//! - `{{ path }}` templates in string leaves render against the final tree
//!
//! # Example
//!
//! ```rust
//! use tagforge_core::{load_yaml, LoadOptions, SafetyMode, Value};
//!
//! let yaml = r#"
//! name: service
//! url: "https://{{ name }}.internal"
//! "#;
//!
//! let options = LoadOptions::new()
//!     .with_mode(SafetyMode::Safe)
//!     .with_resolve_strings(true);
//! let value = load_yaml(yaml, &options).unwrap();
//! assert_eq!(value.get_path("url"), Some(&Value::from("https://service.internal")));
//! ```

pub mod convert;
pub mod env;
pub mod error;
pub mod fetch;
pub mod format;
pub mod inherit;
pub mod ini;
pub mod parser;
pub mod record;
pub mod tags;
pub mod template;
pub mod value;

mod include;
mod yaml;

pub use convert::{Converter, TypeConverters};
pub use env::EnvReference;
pub use error::{Error, ErrorKind, Result, SourceLocation};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{DefaultFetcher, Fetcher, FileFetcher};
pub use format::{dump, dump_file, load, load_file, DumpOptions, DumpShape, Format, FormatMode};
pub use inherit::INHERIT_KEY;
pub use parser::{load_yaml, load_yaml_file, LoadOptions, Parser, SafetyMode};
pub use record::{FieldShape, FieldSpec, Record, RecordSchema};
pub use tags::{TagFn, TagHandler, TagRegistry};
pub use template::{resolve_strings, PathRenderer, TemplateRenderer};
pub use value::Value;
